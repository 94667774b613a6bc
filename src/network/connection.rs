//! Connection Handler
//!
//! Serves one client connection of the reference storage server.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, StowageError};
use crate::protocol::{
    read_command_line, write_frame, Command, Response, DEFAULT_MAX_LINE_LENGTH,
};
use crate::store::MemoryStore;

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for line reads)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the object store
    store: Arc<MemoryStore>,

    /// Peer address for logging
    peer_addr: String,

    /// Longest command line read before giving up on the peer
    max_line_length: usize,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O
    pub fn new(stream: TcpStream, store: Arc<MemoryStore>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            store,
            peer_addr,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        })
    }

    /// Cap the length of one command line
    pub fn set_max_line_length(&mut self, len: usize) {
        self.max_line_length = len.max(1);
    }

    /// Configure connection timeouts (0 leaves a direction unbounded)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads command lines in a loop and answers each with exactly one frame.
    /// Returns when the client disconnects or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let line = match read_command_line(&mut self.reader, self.max_line_length) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(StowageError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection to {} ended: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(StowageError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(StowageError::Io(ref e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    // Line was not UTF-8
                    tracing::warn!("Unreadable command from {}: {}", self.peer_addr, e);
                    self.send_response(&Response::bad_request())?;
                    continue;
                }
                Err(StowageError::Protocol(ref msg)) => {
                    // The rest of the line is still unread, so the stream is out of sync
                    tracing::warn!("Dropping client {}: {}", self.peer_addr, msg);
                    self.send_response(&Response::bad_request())?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            let response = match Command::parse(&line) {
                Ok(command) => {
                    tracing::trace!("Received {} from {}", command.verb(), self.peer_addr);
                    self.store.execute(command)
                }
                Err(e) => {
                    tracing::debug!("Bad request from {}: {}", self.peer_addr, e);
                    Response::bad_request()
                }
            };

            if let Err(e) = self.send_response(&response) {
                if let StowageError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Send a response frame to the client
    fn send_response(&mut self, response: &Response) -> Result<()> {
        write_frame(&mut self.writer, response.to_payload().as_bytes())
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}
