//! Protocol Module
//!
//! Defines the wire protocol spoken with the storage service.
//!
//! ## Protocol Format
//!
//! ### Request Format
//! Commands are single text lines terminated by `\n`:
//! ```text
//! PUT <key> <base64Payload>\n
//! GET <key>\n
//! DELETE <key>\n
//! SEARCH <text>\n
//! ```
//!
//! ### Response Format
//! ```text
//! ┌──────────────────┬────────────────────────────────────┐
//! │ Len (8, ASCII)   │ Payload (Len bytes)                │
//! └──────────────────┴────────────────────────────────────┘
//! ```
//! The header is the decimal payload length, padded with whitespace.
//! The payload is a status line, optionally followed by `\n` and a body.
//!
//! ### Status Codes
//! - 200: OK (GET/SEARCH, with body)
//! - 201: CREATED (PUT)
//! - 204: NO_CONTENT (DELETE)
//! - 400: BAD_REQUEST
//! - 404: NOT_FOUND
//! - 500: INTERNAL_SERVER_ERROR
//!
//! There is no request identifier on the wire. A response can only be matched
//! to its command by position in the stream.

mod codec;
mod command;
mod response;

pub use codec::{
    encode_command, encode_frame, read_command_line, write_frame, FrameDecoder,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_LINE_LENGTH, HEADER_SIZE, MAX_ENCODABLE_LEN,
};
pub use command::{validate_key, Command, Verb};
pub use response::{
    Response, STATUS_BAD_REQUEST, STATUS_CREATED, STATUS_INTERNAL_ERROR, STATUS_NOT_FOUND,
    STATUS_NO_CONTENT, STATUS_OK,
};
