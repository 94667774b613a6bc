//! Single-flight request queue
//!
//! The wire protocol carries no request identifier, so a response can only be
//! attributed to a command by its position in the byte stream. The dispatcher
//! keeps that attribution sound by letting at most one request be in flight:
//!
//! ```text
//!   callers ──Submit──┐
//!   connect thread ───┼──▶ events ──▶ Dispatcher ──write──▶ socket
//!   reader thread ────┘                 │  ▲
//!                                        │  └─ Data (chunks for the active request)
//!                                        ▼
//!                          VecDeque<PendingRequest> (FIFO)
//! ```
//!
//! Every state change happens on the dispatcher thread, in event order. A
//! request moves Queued → Active → Resolved/Failed, and the next one is only
//! written after the previous one has left the Active slot.

use std::collections::VecDeque;
use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::connection::ConnectionManager;
use crate::error::{Result, StowageError};
use crate::protocol::FrameDecoder;

/// Inputs to the dispatcher
pub enum Event {
    /// A caller queued a command
    Submit(PendingRequest),

    /// A connect attempt succeeded
    Connected { generation: u64, stream: TcpStream },

    /// A connect attempt failed
    ConnectFailed { generation: u64, error: String },

    /// The reader thread received bytes
    Data { generation: u64, bytes: Bytes },

    /// The reader thread saw EOF or an error
    Closed { generation: u64, reason: String },

    /// The owning client was dropped
    Shutdown,
}

/// A queued command and the handle its caller waits on
pub struct PendingRequest {
    /// Newline-terminated command line
    line: String,

    /// Position in submission order (set by the dispatcher)
    seq: u64,

    completion: Sender<Result<String>>,
}

impl PendingRequest {
    /// Create a request and the completion its caller will wait on
    pub fn new(line: String) -> (Self, Completion) {
        let (tx, rx) = channel::bounded(1);
        let request = Self {
            line,
            seq: 0,
            completion: tx,
        };
        (request, Completion { rx })
    }

    fn resolve(self, result: Result<String>) {
        // The caller may have stopped waiting
        let _ = self.completion.send(result);
    }

    fn fail(self, error: StowageError) {
        tracing::debug!("Request #{} failed: {}", self.seq, error);
        self.resolve(Err(error));
    }
}

/// Handle to the outcome of a submitted command
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<Result<String>>,
}

impl Completion {
    /// Block until the request resolves or fails
    pub fn wait(self) -> Result<String> {
        self.rx
            .recv()
            .map_err(|_| StowageError::Connection("client shut down".to_string()))?
    }
}

/// The request currently wired to incoming bytes
struct ActiveRequest {
    request: PendingRequest,

    /// Response accumulator, discarded with the request
    decoder: FrameDecoder,

    deadline: Option<Instant>,
}

/// Actor that owns the queue, the active request and the connection
pub struct Dispatcher {
    events: Receiver<Event>,
    queue: VecDeque<PendingRequest>,
    active: Option<ActiveRequest>,
    connection: ConnectionManager,
    request_timeout: Option<Duration>,
    max_frame_size: usize,
    next_seq: u64,
}

impl Dispatcher {
    pub fn new(
        events: Receiver<Event>,
        connection: ConnectionManager,
        request_timeout: Option<Duration>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            events,
            queue: VecDeque::new(),
            active: None,
            connection,
            request_timeout,
            max_frame_size,
            next_seq: 0,
        }
    }

    /// Process events until shutdown
    pub fn run(mut self) {
        tracing::debug!("Dispatcher started");

        loop {
            let deadline = self.active.as_ref().and_then(|active| active.deadline);
            let event = match deadline {
                Some(deadline) => match self.events.recv_deadline(deadline) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.events.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            match event {
                Some(Event::Shutdown) => break,
                Some(event) => self.handle(event),
                None => self.expire_active(),
            }

            // recv_deadline hands out queued events even past the deadline
            if self.active_expired() {
                self.expire_active();
            }

            self.process_next();
        }

        self.shutdown();
        tracing::debug!("Dispatcher stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Submit(mut request) => {
                self.next_seq += 1;
                request.seq = self.next_seq;
                tracing::trace!("Request #{} queued: {:?}", request.seq, request.line.trim_end());
                self.queue.push_back(request);
            }
            Event::Connected { generation, stream } => {
                self.connection.on_connected(generation, stream);
            }
            Event::ConnectFailed { generation, error } => {
                self.connection.on_connect_failed(generation, &error);
            }
            Event::Data { generation, bytes } => self.on_data(generation, &bytes),
            Event::Closed { generation, reason } => {
                if self.connection.on_closed(generation, &reason) {
                    if let Some(active) = self.active.take() {
                        active.request.fail(StowageError::Connection(format!(
                            "connection lost: {}",
                            reason
                        )));
                    }
                }
            }
            Event::Shutdown => {}
        }
    }

    /// Dispatch queued requests until one is in flight or the queue is empty
    ///
    /// While the connection is down, each dequeued request triggers a connect
    /// attempt and fails immediately rather than waiting for it.
    fn process_next(&mut self) {
        while self.active.is_none() {
            let request = match self.queue.pop_front() {
                Some(request) => request,
                None => return,
            };

            if !self.connection.is_connected() {
                self.connection.ensure_connection();
                request.fail(StowageError::Connection(
                    "storage service disconnected".to_string(),
                ));
                continue;
            }

            // Accumulator exists before the command hits the wire
            let decoder = FrameDecoder::with_max_frame_size(self.max_frame_size);
            if let Err(e) = self.connection.write_all(request.line.as_bytes()) {
                let error = match (e.kind(), self.request_timeout) {
                    (io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut, Some(timeout)) => {
                        tracing::warn!(
                            "Request #{} write stalled past {:?}, connection reset",
                            request.seq,
                            timeout
                        );
                        StowageError::Timeout(timeout)
                    }
                    _ => StowageError::Connection(format!("write failed: {}", e)),
                };
                request.fail(error);
                continue;
            }

            tracing::trace!("Request #{} in flight", request.seq);
            self.active = Some(ActiveRequest {
                request,
                decoder,
                deadline: self.request_timeout.map(|timeout| Instant::now() + timeout),
            });
        }
    }

    fn on_data(&mut self, generation: u64, bytes: &[u8]) {
        if generation != self.connection.generation() {
            tracing::trace!("Ignoring {} bytes from old connection", bytes.len());
            return;
        }

        let decoded = match self.active.as_mut() {
            Some(active) => active.decoder.decode_chunk(bytes),
            None => {
                tracing::warn!("Discarding {} bytes received with no request in flight", bytes.len());
                return;
            }
        };

        let result = match decoded {
            Ok(None) => return,
            Ok(Some(frame)) => frame_to_string(frame),
            Err(e) => Err(e),
        };

        if let Some(active) = self.active.take() {
            let trailing = active.decoder.buffered();
            if trailing > 0 {
                tracing::warn!(
                    "Discarding {} bytes trailing the response to request #{}",
                    trailing,
                    active.request.seq
                );
            }
            match result {
                Ok(response) => {
                    tracing::trace!("Request #{} resolved", active.request.seq);
                    active.request.resolve(Ok(response));
                }
                Err(e) => active.request.fail(e),
            }
        }
    }

    fn active_expired(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|active| active.deadline)
            .map_or(false, |deadline| deadline <= Instant::now())
    }

    /// Fail the active request whose deadline passed and reset the connection
    ///
    /// The reset guarantees a late response cannot be read as the next
    /// request's answer.
    fn expire_active(&mut self) {
        if let Some(active) = self.active.take() {
            let timeout = self.request_timeout.unwrap_or_default();
            tracing::warn!(
                "Request #{} timed out after {:?}, resetting connection",
                active.request.seq,
                timeout
            );
            self.connection.disconnect();
            active.request.fail(StowageError::Timeout(timeout));
        }
    }

    fn shutdown(&mut self) {
        let closed = || StowageError::Connection("client shut down".to_string());

        if let Some(active) = self.active.take() {
            active.request.fail(closed());
        }
        for request in self.queue.drain(..) {
            request.fail(closed());
        }
        while let Ok(event) = self.events.try_recv() {
            if let Event::Submit(request) = event {
                request.fail(closed());
            }
        }

        self.connection.disconnect();
    }
}

fn frame_to_string(frame: Bytes) -> Result<String> {
    String::from_utf8(frame.to_vec())
        .map_err(|e| StowageError::Protocol(format!("response is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::connection::StateCell;
    use crate::config::ClientConfig;

    #[test]
    fn test_expired_request_fails_while_events_keep_arriving() {
        let (tx, rx) = channel::unbounded();
        let config = ClientConfig::builder().request_timeout_ms(50).build();
        let connection = ConnectionManager::new(&config, Arc::new(StateCell::new()), tx.clone());
        let mut dispatcher = Dispatcher::new(rx, connection, config.request_timeout(), 1024);

        let (request, completion) = PendingRequest::new("GET slow\n".to_string());
        dispatcher.active = Some(ActiveRequest {
            request,
            decoder: FrameDecoder::new(),
            deadline: Some(Instant::now()),
        });

        // Both events are already queued when the deadline is checked
        tx.send(Event::Data {
            generation: 99,
            bytes: Bytes::from_static(b"0000"),
        })
        .unwrap();
        tx.send(Event::Shutdown).unwrap();
        dispatcher.run();

        assert!(matches!(completion.wait(), Err(StowageError::Timeout(_))));
    }
}
