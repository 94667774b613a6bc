//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Command Format
//! ```text
//! <VERB> <key>[ <base64Payload>]\n
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────────────┬────────────────────────────────────┐
//! │ Len (8, ASCII)   │ Payload                            │
//! └──────────────────┴────────────────────────────────────┘
//! ```
//!
//! Responses may arrive split at any byte boundary. [`FrameDecoder`]
//! accumulates chunks until one whole frame is buffered.

use std::io::{BufRead, Read, Write};

use bytes::{Bytes, BytesMut};

use super::Verb;
use crate::error::{Result, StowageError};

/// Header size: 8 bytes of decimal ASCII length
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest length that fits in the 8-digit header
pub const MAX_ENCODABLE_LEN: usize = 99_999_999;

/// Default cap on one command line read by the server (64 MB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

// =============================================================================
// Command Encoding
// =============================================================================

/// Encode a command line
///
/// Format: `"<VERB> <key>[ <payload>]\n"`. The payload must already be base64.
pub fn encode_command(verb: Verb, key: &str, payload: Option<&str>) -> String {
    let verb = verb.as_str();
    let mut line = String::with_capacity(
        verb.len() + key.len() + payload.map_or(0, |p| p.len() + 1) + 2,
    );
    line.push_str(verb);
    line.push(' ');
    line.push_str(key);
    if let Some(payload) = payload {
        line.push(' ');
        line.push_str(payload);
    }
    line.push('\n');
    line
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode a response frame
///
/// Format: length as decimal, left-aligned and space-padded to 8 bytes, then payload
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_ENCODABLE_LEN {
        return Err(StowageError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_ENCODABLE_LEN
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(format!("{:<width$}", payload.len(), width = HEADER_SIZE).as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parse the 8-byte length header
fn parse_header(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| StowageError::Protocol(format!("non-ASCII length header {:?}", header)))?;

    text.trim().parse::<usize>().map_err(|_| {
        StowageError::Protocol(format!("non-numeric length header {:?}", text))
    })
}

/// Accumulator for one response frame
///
/// Holds the raw bytes received so far and, once 8 bytes have arrived, the
/// parsed payload length. Bytes are consumed strictly in order.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes received but not yet consumed
    buffer: BytesMut,

    /// Payload length from the header, once parsed
    expected: Option<usize>,

    /// Largest payload length accepted
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            expected: None,
            max_frame_size,
        }
    }

    /// Append a chunk and try to complete the frame
    ///
    /// Returns:
    /// - `Ok(Some(payload))` once a whole frame is buffered
    /// - `Ok(None)` if more bytes are needed
    /// - `Err(...)` if the header is not a decimal length or exceeds the limit
    ///
    /// Bytes following a completed frame stay buffered and are reported by
    /// [`buffered`](Self::buffered).
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Result<Option<Bytes>> {
        self.buffer.extend_from_slice(chunk);

        if self.expected.is_none() {
            if self.buffer.len() < HEADER_SIZE {
                return Ok(None);
            }

            let len = parse_header(&self.buffer[..HEADER_SIZE])?;
            if len > self.max_frame_size {
                return Err(StowageError::Protocol(format!(
                    "Frame too large: {} bytes (max {})",
                    len, self.max_frame_size
                )));
            }

            let _ = self.buffer.split_to(HEADER_SIZE);
            self.expected = Some(len);
            // Reserve up front so large payloads grow the buffer once
            self.buffer.reserve(len.saturating_sub(self.buffer.len()));
        }

        match self.expected {
            Some(len) if self.buffer.len() >= len => {
                self.expected = None;
                Ok(Some(self.buffer.split_to(len).freeze()))
            }
            _ => Ok(None),
        }
    }

    /// Payload length from the header, if parsed
    pub fn expected_len(&self) -> Option<usize> {
        self.expected
    }

    /// Number of unconsumed bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes and forget the parsed header
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = None;
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one command line from a stream
///
/// Returns `Ok(None)` at end of stream. A final line without `\n` is still
/// returned. At most `max_len` bytes are consumed; a longer line is a
/// protocol error and leaves the rest of it unread.
pub fn read_command_line<R: BufRead>(reader: &mut R, max_len: usize) -> Result<Option<String>> {
    let mut line = String::new();
    let read = reader.by_ref().take(max_len as u64).read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if read == max_len && !line.ends_with('\n') {
        return Err(StowageError::Protocol(format!(
            "command line exceeds {} bytes",
            max_len
        )));
    }
    Ok(Some(line))
}

/// Write a response frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}
