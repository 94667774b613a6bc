//! TCP Server
//!
//! Accepts connections and serves each on its own thread.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::Connection;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::store::MemoryStore;

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Reference storage server
pub struct Server {
    config: ServerConfig,
    store: Arc<MemoryStore>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

/// Stops a running [`Server`] from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Signal the server to stop accepting connections
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl Server {
    /// Bind the listen address
    pub fn bind(config: ServerConfig, store: Arc<MemoryStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking accept so the loop can observe shutdown
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            store,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Run the accept loop until shutdown is signalled
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Hand an accepted stream to a worker thread
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if self.active_connections.load(Ordering::Relaxed) >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: {} connections already open",
                peer,
                self.config.max_connections
            );
            return;
        }

        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure stream from {}: {}", peer, e);
            return;
        }

        let mut connection = match Connection::new(stream, Arc::clone(&self.store)) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", peer, e);
                return;
            }
        };
        if let Err(e) =
            connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)
        {
            tracing::warn!("Failed to set timeouts for {}: {}", peer, e);
            return;
        }
        connection.set_max_line_length(self.config.max_line_length);

        let active = Arc::clone(&self.active_connections);
        active.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("stowage-conn-{}", peer))
            .spawn({
                let active = Arc::clone(&active);
                move || {
                    if let Err(e) = connection.handle() {
                        tracing::warn!("Connection {} closed with error: {}", connection.peer_addr(), e);
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn worker for {}: {}", peer, e);
            active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
