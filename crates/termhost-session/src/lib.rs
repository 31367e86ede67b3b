//! # termhost-session
//!
//! Console sessions for termhost.
//!
//! This crate provides:
//! - Ordered input delivery (`InputSequencer`)
//! - Output splitting, prompt detection and the transcript buffer
//! - Channel selection between request/response and the direct socket
//! - Hidden environment capture (`PrivateCommandLoop`)
//! - Console process lifecycle and the process table
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termhost-core and
//! termhost-pty, and talks to its owner only through the `EventSink`,
//! `ChannelRegistry` and `SessionStore` traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod events;
pub mod manager;
pub mod output;
pub mod private_command;
pub mod process;
pub mod prompt;
pub mod sequencer;
pub mod store;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use channel::{select_channel, ChannelRegistry, SocketCallbacks, SocketConnection};
pub use events::{ConsoleEvent, EventSink};
pub use manager::{ConsoleProcessTable, TERMINAL_SEQUENCE_ENV};
pub use output::{trim_leading_lines, OutputBuffer, BUFFER_CHUNK_SIZE};
pub use private_command::{PrivateCommandLoop, PrivateCommandTick};
pub use process::{
    ConsoleContext, ConsoleProcess, ExitHandler, LaunchShape, PromptAction, PromptHandler,
};
pub use prompt::{classify_fragment, normalize_line_endings, split_output, FragmentKind, SplitOutput};
pub use sequencer::{InputSequencer, AUTO_FLUSH_LENGTH};
pub use store::{FileStore, SessionStore, StateSaver};
