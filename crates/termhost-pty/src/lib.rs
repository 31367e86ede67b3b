//! # termhost-pty
//!
//! Child process supervision for termhost.
//!
//! This crate provides:
//! - The [`ProcessOperations`], [`ProcessCallbacks`] and [`ProcessSupervisor`] seams
//! - Pseudo-terminal children via portable-pty
//! - Piped children for processes that never interact
//! - A supervising thread per child that drives its continuation tick
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on termhost-core
//! and knows nothing about sessions, channels or prompts.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod child;
pub mod decoder;
pub mod ops;
pub mod pipe;
pub mod probe;
pub mod pty;
pub mod supervisor;

// Re-export commonly used types
pub use decoder::Utf8Decoder;
pub use ops::{Launch, ProcessCallbacks, ProcessOperations, ProcessOptions, ProcessSupervisor};
pub use pipe::PipeChild;
pub use pty::PtyChild;
pub use supervisor::{PtySupervisor, POLL_INTERVAL, PROBE_INTERVAL};
