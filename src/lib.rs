//! # Stowage
//!
//! Client for a line-command, length-prefixed object-storage protocol:
//! - One persistent TCP connection shared by any number of callers
//! - Strict single-flight FIFO dispatch (the protocol has no correlation IDs)
//! - Lazy reconnection with fail-fast while the service is down
//! - An in-memory reference server speaking the same protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  StorageClient (facade)                      │
//! │            put / get / delete / search / send                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Submit
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                Dispatcher (single flight)                    │
//! │         FIFO queue + one active FrameDecoder                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Connection  │          │   Reader    │
//!   │  Manager    │◀────────▶│   thread    │
//!   └──────┬──────┘          └─────────────┘
//!          │ TCP
//!          ▼
//!   ┌─────────────┐
//!   │  Storage    │
//!   │  service    │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod client;
pub mod network;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::{Completion, ConnectionState, StorageClient};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Result, StowageError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Stowage
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
