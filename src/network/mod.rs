//! Network Module
//!
//! Reference storage server speaking the wire protocol.
//!
//! ## Architecture
//! - Single acceptor loop
//! - One worker thread per connection
//! - Commands routed through the MemoryStore

mod connection;
mod server;

pub use connection::Connection;
pub use server::{Server, ShutdownHandle};
