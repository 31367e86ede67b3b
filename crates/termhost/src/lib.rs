//! Termhost MCP Server Library
//!
//! This library contains the MCP protocol layer, the request/response event
//! queue and the direct-socket channel. The server binary is in main.rs.

pub mod events;
pub mod protocol;
pub mod socket;
pub mod tools;

// Re-export commonly used types
pub use events::{EventQueue, DEFAULT_EVENT_CAPACITY};
pub use protocol::TermhostServer;
pub use socket::TcpChannelRegistry;
pub use tools::*;
