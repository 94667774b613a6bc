//! Error types for Stowage
//!
//! Provides a unified error type for all operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using StowageError
pub type Result<T> = std::result::Result<T, StowageError>;

/// Unified error type for Stowage operations
#[derive(Debug, Error)]
pub enum StowageError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    /// Transport unavailable at dispatch time, or lost mid-request
    #[error("Connection error: {0}")]
    Connection(String),

    /// The active request outlived its deadline; the connection was reset
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// Well-formed response carrying a status other than the expected one
    #[error("Storage error: status {status} (expected {expected})")]
    Storage { status: u16, expected: u16 },

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StowageError {
    /// True for failures of the transport rather than of the response
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StowageError::Connection(_) | StowageError::Timeout(_) | StowageError::Io(_)
        )
    }

    /// True when the response framing or encoding was malformed
    pub fn is_protocol(&self) -> bool {
        matches!(self, StowageError::Protocol(_))
    }

    /// The status code carried by a storage error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            StowageError::Storage { status, .. } => Some(*status),
            _ => None,
        }
    }
}
