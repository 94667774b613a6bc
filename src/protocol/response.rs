//! Response definitions
//!
//! Represents the payload of one response frame.

use crate::error::{Result, StowageError};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// A decoded frame payload: status code plus optional body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Three-digit status code
    pub status: u16,

    /// Body text (GET content, SEARCH results)
    pub body: Option<String>,
}

impl Response {
    /// Create an OK response carrying a body
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            body: Some(body.into()),
        }
    }

    /// Create a response with a status and no body
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn created() -> Self {
        Self::status(STATUS_CREATED)
    }

    pub fn no_content() -> Self {
        Self::status(STATUS_NO_CONTENT)
    }

    pub fn bad_request() -> Self {
        Self::status(STATUS_BAD_REQUEST)
    }

    pub fn not_found() -> Self {
        Self::status(STATUS_NOT_FOUND)
    }

    pub fn internal_error() -> Self {
        Self::status(STATUS_INTERNAL_ERROR)
    }

    /// Parse a frame payload
    ///
    /// Accepts `"204"`, `"200\nbody"` and the reason-phrase form
    /// `"200 Ok\n\nbody\n"`: the status line may carry text after the code, one
    /// blank separator line before the body is skipped, and one trailing newline
    /// after the body is dropped.
    pub fn parse(payload: &str) -> Result<Self> {
        let (status_line, rest) = payload.split_once('\n').unwrap_or((payload, ""));
        let status_line = status_line.trim_end_matches('\r');

        let code = status_line.get(..3).ok_or_else(|| {
            StowageError::Protocol(format!("status line too short: {:?}", status_line))
        })?;
        let well_formed = code.bytes().all(|b| b.is_ascii_digit())
            && matches!(status_line.as_bytes().get(3).copied(), None | Some(b' '));
        if !well_formed {
            return Err(StowageError::Protocol(format!(
                "malformed status line: {:?}",
                status_line
            )));
        }
        let status = code
            .parse::<u16>()
            .map_err(|e| StowageError::Protocol(format!("bad status code {:?}: {}", code, e)))?;

        let body = rest.strip_prefix('\n').unwrap_or(rest);
        let body = body.strip_suffix('\n').unwrap_or(body);
        let body = (!body.is_empty()).then(|| body.to_string());

        Ok(Self { status, body })
    }

    /// Render as a frame payload (`"<status>"` or `"<status>\n<body>"`)
    pub fn to_payload(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n{}", self.status, body),
            None => self.status.to_string(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Require a specific status, turning anything else into a storage error
    pub fn expect_status(self, expected: u16) -> Result<Self> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(StowageError::Storage {
                status: self.status,
                expected,
            })
        }
    }
}
