//! # termhost-core
//!
//! Core types for termhost.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other termhost crates. It provides:
//!
//! - Terminal dimensions
//! - Console process records (handles, channel modes, persisted state)
//! - Input events and their sequencing tags
//! - Shell discovery
//! - Configuration
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other termhost crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod console;
pub mod error;
pub mod geometry;
pub mod input;
pub mod shell;

// Re-export commonly used types
pub use config::{ChannelSettings, ServerConfig, ServerSettings, TerminalSettings};
pub use console::{
    ChannelMode, ConsoleHandle, ConsoleProcessInfo, InteractionMode, DEFAULT_MAX_OUTPUT_LINES,
    MAX_HANDLE_LENGTH,
};
pub use error::{Error, Result};
pub use geometry::Dimensions;
pub use input::{Input, Sequence};
pub use shell::{AvailableShells, ShellType, TerminalShell};
