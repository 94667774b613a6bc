//! Client Module
//!
//! Persistent-connection client for the storage service.
//!
//! ## Architecture
//! - One dispatcher thread owns the queue and the connection
//! - One reader thread per live connection feeds it bytes
//! - Callers block on a per-request completion handle
//!
//! ## Example
//! ```no_run
//! use stowage::{ClientConfig, StorageClient};
//!
//! let config = ClientConfig::builder().server_addr("127.0.0.1:8080").build();
//! let client = StorageClient::connect(config)?;
//!
//! client.put("1_1718000000000_notes.txt", b"hello")?;
//! assert_eq!(client.get("1_1718000000000_notes.txt")?, b"hello");
//! client.delete("1_1718000000000_notes.txt")?;
//! # Ok::<(), stowage::StowageError>(())
//! ```

mod connection;
mod queue;

pub use connection::{ConnectionState, StateCell};
pub use queue::Completion;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use crossbeam::channel::{self, Sender};

use crate::config::ClientConfig;
use crate::error::{Result, StowageError};
use crate::protocol::{
    Command, Response, STATUS_CREATED, STATUS_NO_CONTENT, STATUS_OK,
};
use connection::ConnectionManager;
use queue::{Dispatcher, Event, PendingRequest};

/// Handle to a storage client
///
/// Cheap to clone; all clones share one connection and one queue. The
/// dispatcher stops when the last clone is dropped.
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    events: Sender<Event>,
    state: Arc<StateCell>,
    config: ClientConfig,
    worker: Option<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Dispatcher thread panicked");
            }
        }
    }
}

impl StorageClient {
    /// Start a client and begin connecting in the background
    ///
    /// Returns immediately; commands sent before the connection is up fail
    /// with a connection error.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.server_addr.trim().is_empty() {
            return Err(StowageError::Config("server address is empty".to_string()));
        }

        let (events_tx, events_rx) = channel::unbounded();
        let state = Arc::new(StateCell::new());

        let mut connection = ConnectionManager::new(&config, Arc::clone(&state), events_tx.clone());
        connection.ensure_connection();

        let dispatcher = Dispatcher::new(
            events_rx,
            connection,
            config.request_timeout(),
            config.max_frame_size,
        );
        let worker = thread::Builder::new()
            .name("stowage-dispatcher".to_string())
            .spawn(move || dispatcher.run())?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                events: events_tx,
                state,
                config,
                worker: Some(worker),
            }),
        })
    }

    /// Start a client and wait up to the connect timeout for the connection
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let timeout = config.connect_timeout();
        let client = Self::new(config)?;

        match client.wait_settled(timeout) {
            ConnectionState::Connected => Ok(client),
            state => Err(StowageError::Connection(format!(
                "could not connect to {} ({:?})",
                client.inner.config.server_addr, state
            ))),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Wait until connected; false if the timeout passed first
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.wait_for_state(ConnectionState::Connected, timeout)
    }

    /// Wait until the connection reaches `target`
    pub fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        self.inner.state.wait_until(timeout, |state| state == target) == target
    }

    /// Wait until no connect attempt is pending and return the state
    pub fn wait_settled(&self, timeout: Duration) -> ConnectionState {
        self.inner
            .state
            .wait_until(timeout, |state| state != ConnectionState::Connecting)
    }

    // =========================================================================
    // Raw commands
    // =========================================================================

    /// Queue a raw command line without waiting for its response
    ///
    /// `command` must not contain a line break; the terminator is added here.
    pub fn submit(&self, command: &str) -> Result<Completion> {
        if command.is_empty() {
            return Err(StowageError::InvalidRequest("command is empty".to_string()));
        }
        if command.contains(['\n', '\r']) {
            return Err(StowageError::InvalidRequest(
                "command contains a line break".to_string(),
            ));
        }
        self.enqueue(format!("{}\n", command))
    }

    /// Send a raw command line and wait for the decoded frame payload
    pub fn send(&self, command: &str) -> Result<String> {
        self.submit(command)?.wait()
    }

    /// Send a typed command and parse its response
    pub fn execute(&self, command: &Command) -> Result<Response> {
        let payload = self.enqueue(command.encode())?.wait()?;
        Response::parse(&payload)
    }

    fn enqueue(&self, line: String) -> Result<Completion> {
        let (request, completion) = PendingRequest::new(line);
        self.inner
            .events
            .send(Event::Submit(request))
            .map_err(|_| StowageError::Connection("client shut down".to_string()))?;
        Ok(completion)
    }

    // =========================================================================
    // Object operations
    // =========================================================================

    /// Store an object (expects 201)
    pub fn put(&self, key: &str, payload: &[u8]) -> Result<()> {
        self.execute(&Command::put(key, payload)?)?
            .expect_status(STATUS_CREATED)?;
        Ok(())
    }

    /// Fetch an object's bytes (expects 200)
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self.execute(&Command::get(key)?)?.expect_status(STATUS_OK)?;
        match response.body {
            Some(body) => BASE64
                .decode(body.trim())
                .map_err(|e| StowageError::Protocol(format!("invalid base64 body: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Remove an object (expects 204)
    pub fn delete(&self, key: &str) -> Result<()> {
        self.execute(&Command::delete(key)?)?
            .expect_status(STATUS_NO_CONTENT)?;
        Ok(())
    }

    /// List keys whose name or content contains `text` (expects 200)
    pub fn search(&self, text: &str) -> Result<Vec<String>> {
        let response = self.execute(&Command::search(text)?)?.expect_status(STATUS_OK)?;
        Ok(response
            .body
            .map(|body| body.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("server_addr", &self.inner.config.server_addr)
            .field("state", &self.state())
            .finish()
    }
}
