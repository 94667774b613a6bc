//! Connection Manager
//!
//! Owns the one TCP connection to the storage service.
//!
//! ## State Machine
//! ```text
//! Disconnected ──ensure_connection()──▶ Connecting ──connect ok──▶ Connected
//!      ▲                                    │                         │
//!      └────────────connect failed──────────┘                         │
//!      └──────────────────────error / close / reset───────────────────┘
//! ```
//!
//! Connect attempts run on a short-lived thread and report back to the
//! dispatcher as events; nothing here blocks the caller. Every attempt gets a
//! new generation number, and each connection's reader thread tags its events
//! with it, so events from a superseded connection are recognised and dropped.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::Sender;
use parking_lot::{Condvar, Mutex};

use super::queue::Event;
use crate::config::ClientConfig;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Observable copy of the connection state
///
/// Written only by the dispatcher; readable from any thread.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<ConnectionState>,
    changed: Condvar,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::trace!("Connection state {:?} -> {:?}", *current, state);
            *current = state;
            self.changed.notify_all();
        }
    }

    /// Block until `done` holds for the state or the timeout passes
    ///
    /// Returns the state observed last.
    pub fn wait_until<F>(&self, timeout: Duration, mut done: F) -> ConnectionState
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !done(*state) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the transport and its lifecycle
pub struct ConnectionManager {
    /// Storage service address (host:port)
    addr: String,

    connect_timeout: Duration,

    /// Bound on a single blocked write, taken from the request deadline
    write_timeout: Option<Duration>,

    /// Size of each socket read
    read_buffer_size: usize,

    /// Shared state mirror
    state: Arc<StateCell>,

    /// Generation of the current (or pending) connection
    generation: u64,

    /// Write half; the reader thread holds a clone of the same socket
    stream: Option<TcpStream>,

    /// Where connect and reader threads report
    events: Sender<Event>,
}

impl ConnectionManager {
    pub fn new(config: &ClientConfig, state: Arc<StateCell>, events: Sender<Event>) -> Self {
        Self {
            addr: config.server_addr.clone(),
            connect_timeout: config.connect_timeout(),
            write_timeout: config.request_timeout(),
            read_buffer_size: config.read_buffer_size.max(1),
            state,
            generation: 0,
            stream: None,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.stream.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a connect attempt unless one is live or pending
    ///
    /// Never blocks and never fails: the outcome arrives later as
    /// [`Event::Connected`] or [`Event::ConnectFailed`] and is visible only
    /// through the state.
    pub fn ensure_connection(&mut self) {
        if self.state() != ConnectionState::Disconnected {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.state.set(ConnectionState::Connecting);
        tracing::debug!("Connecting to {} (generation {})", self.addr, generation);

        let addr = self.addr.clone();
        let timeout = self.connect_timeout;
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name("stowage-connect".to_string())
            .spawn(move || {
                let event = match open_stream(&addr, timeout) {
                    Ok(stream) => Event::Connected { generation, stream },
                    Err(e) => Event::ConnectFailed {
                        generation,
                        error: e.to_string(),
                    },
                };
                // The dispatcher may already be gone
                let _ = events.send(event);
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn connect thread: {}", e);
            self.state.set(ConnectionState::Disconnected);
        }
    }

    /// Adopt a freshly connected socket and start its reader thread
    pub fn on_connected(&mut self, generation: u64, stream: TcpStream) {
        if generation != self.generation || self.state() != ConnectionState::Connecting {
            tracing::debug!("Dropping stale connection (generation {})", generation);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        // A peer that stops reading must not park the dispatcher in a write
        if let Err(e) = stream.set_write_timeout(self.write_timeout) {
            tracing::warn!("Failed to set write timeout for {}: {}", self.addr, e);
            let _ = stream.shutdown(Shutdown::Both);
            self.state.set(ConnectionState::Disconnected);
            return;
        }

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Failed to clone stream for {}: {}", self.addr, e);
                let _ = stream.shutdown(Shutdown::Both);
                self.state.set(ConnectionState::Disconnected);
                return;
            }
        };

        let events = self.events.clone();
        let buffer_size = self.read_buffer_size;
        let spawned = thread::Builder::new()
            .name("stowage-reader".to_string())
            .spawn(move || read_loop(reader, generation, events, buffer_size));

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn reader thread: {}", e);
            let _ = stream.shutdown(Shutdown::Both);
            self.state.set(ConnectionState::Disconnected);
            return;
        }

        tracing::info!("Connected to storage service at {}", self.addr);
        self.stream = Some(stream);
        self.state.set(ConnectionState::Connected);
    }

    /// Record a failed connect attempt
    pub fn on_connect_failed(&mut self, generation: u64, error: &str) {
        if generation != self.generation {
            return;
        }
        tracing::warn!("Connection to {} failed: {}", self.addr, error);
        self.state.set(ConnectionState::Disconnected);
    }

    /// Record that the current connection's reader saw an error or EOF
    ///
    /// Returns false when the event belongs to a superseded connection.
    pub fn on_closed(&mut self, generation: u64, reason: &str) -> bool {
        if generation != self.generation || self.stream.is_none() {
            return false;
        }
        tracing::warn!("Connection to {} lost: {}", self.addr, reason);
        self.disconnect();
        true
    }

    /// Write a whole command to the transport
    ///
    /// A failed write drops the connection. With a request timeout configured,
    /// a write the peer stops draining fails with `WouldBlock` or `TimedOut`.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let result = stream.write_all(bytes).and_then(|_| stream.flush());
        if let Err(ref e) = result {
            tracing::warn!("Write to {} failed: {}", self.addr, e);
            self.disconnect();
        }
        result
    }

    /// Shut the socket down and forget it
    ///
    /// Also invalidates any pending connect attempt.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.generation += 1;
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Resolve the address and connect to the first endpoint that accepts
fn open_stream(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    let mut last_err = io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("{} did not resolve to any address", addr),
    );

    for socket_addr in addrs {
        let attempt = if timeout.is_zero() {
            TcpStream::connect(socket_addr)
        } else {
            TcpStream::connect_timeout(&socket_addr, timeout)
        };
        match attempt {
            Ok(stream) => {
                // Disable Nagle's algorithm for low latency
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

/// Forward everything read from the socket to the dispatcher
fn read_loop(mut stream: TcpStream, generation: u64, events: Sender<Event>, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        match stream.read(&mut buffer) {
            Ok(0) => {
                let _ = events.send(Event::Closed {
                    generation,
                    reason: "closed by peer".to_string(),
                });
                return;
            }
            Ok(n) => {
                let bytes = Bytes::copy_from_slice(&buffer[..n]);
                if events.send(Event::Data { generation, bytes }).is_err() {
                    return;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = events.send(Event::Closed {
                    generation,
                    reason: e.to_string(),
                });
                return;
            }
        }
    }
}
