//! Shared helpers for integration tests
//!
//! Scripted servers run on loopback with an OS-assigned port. Each script
//! decides exactly which bytes go out and when, so tests control chunking and
//! ordering on the wire.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use stowage::network::{Server, ShutdownHandle};
use stowage::store::MemoryStore;
use stowage::{ClientConfig, ServerConfig, StorageClient};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Scripted Server
// =============================================================================

/// A one-off server whose behaviour is a closure over the listener
pub struct ScriptedServer {
    pub addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl ScriptedServer {
    pub fn start<F>(script: F) -> Self
    where
        F: FnOnce(TcpListener) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || script(listener));
        Self {
            addr,
            handle: Some(handle),
        }
    }

    /// Wait for the script to finish, re-raising its panics
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("server script panicked");
        }
    }
}

/// A connection accepted by a script
pub struct Peer {
    pub reader: BufReader<TcpStream>,
    pub stream: TcpStream,
}

impl Peer {
    pub fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().unwrap();
        stream.set_nodelay(true).unwrap();
        stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self { reader, stream }
    }

    /// Read one command line without its terminator; None at EOF
    pub fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).unwrap() {
            0 => None,
            _ => Some(line.trim_end_matches('\n').to_string()),
        }
    }

    pub fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.read_line().as_deref(), Some(expected));
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    /// Write a frame with a zero-padded 8-digit header
    pub fn write_frame(&mut self, payload: &str) {
        self.write_raw(frame(payload).as_bytes());
    }

    /// Answer `GET <key>` lines with `200\n<key>` until the client hangs up
    pub fn echo_until_eof(&mut self) -> usize {
        let mut served = 0;
        while let Some(line) = self.read_line() {
            let key = line.strip_prefix("GET ").expect("echo server only serves GET");
            self.write_frame(&format!("200\n{}", key));
            served += 1;
        }
        served
    }
}

pub fn frame(payload: &str) -> String {
    format!("{:08}{}", payload.len(), payload)
}

// =============================================================================
// Reference Server
// =============================================================================

pub struct RunningServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    shutdown: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn start() -> Self {
        Self::with_config(ServerConfig::builder().listen_addr("127.0.0.1:0").build())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let server = Server::bind(config, Arc::clone(&store)).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run().unwrap());
        Self {
            addr,
            store,
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// =============================================================================
// Client Helpers
// =============================================================================

pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::builder()
        .server_addr(addr.to_string())
        .connect_timeout_ms(2000)
        .build()
}

pub fn connect(addr: SocketAddr) -> StorageClient {
    StorageClient::connect(config_for(addr)).unwrap()
}

/// An address nothing is listening on
pub fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
