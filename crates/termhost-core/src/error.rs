//! Error types for termhost.

use thiserror::Error;

use crate::ConsoleHandle;

/// Main error type for console process operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No console process is registered under the handle
    #[error("Console process not found: {0}")]
    ProcessNotFound(ConsoleHandle),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The process could not be launched (e.g. no usable shell)
    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    /// Transport channel errors
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Invalid terminal dimensions
    #[error("Invalid dimensions: {rows}x{cols}")]
    InvalidDimensions {
        /// Number of rows
        rows: u16,
        /// Number of columns
        cols: u16,
    },

    /// Process has been marked as a zombie
    #[error("Console process is a zombie")]
    ProcessZombie,

    /// Process limit reached
    #[error("Process limit reached (max: {0})")]
    ProcessLimitReached(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
