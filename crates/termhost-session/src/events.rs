//! Notifications emitted by console processes.

use serde::{Deserialize, Serialize};

use termhost_core::ConsoleHandle;

/// An event about one console process, keyed by its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsoleEvent {
    /// A prompt was detected in line-oriented output
    #[serde(rename = "prompt-detected")]
    Prompt {
        /// Process handle
        handle: ConsoleHandle,
        /// The prompt text
        prompt: String,
    },
    /// Output was produced (request/response channel only)
    #[serde(rename = "output-produced")]
    Output {
        /// Process handle
        handle: ConsoleHandle,
        /// Output, trimmed to the client's line cap
        output: String,
    },
    /// The process exited
    #[serde(rename = "exit")]
    Exit {
        /// Process handle
        handle: ConsoleHandle,
        /// Exit code
        exit_code: i32,
    },
    /// Child processes appeared under, or disappeared from, the shell
    #[serde(rename = "child-process-presence-changed")]
    Subprocs {
        /// Process handle
        handle: ConsoleHandle,
        /// Whether the shell has child processes
        has_subprocs: bool,
    },
    /// The shell's working directory changed
    #[serde(rename = "working-directory-changed")]
    WorkingDirectory {
        /// Process handle
        handle: ConsoleHandle,
        /// Working directory, with the home directory shown as `~`
        cwd: String,
    },
}

impl ConsoleEvent {
    /// Handle of the process the event is about.
    pub fn handle(&self) -> &ConsoleHandle {
        match self {
            ConsoleEvent::Prompt { handle, .. }
            | ConsoleEvent::Output { handle, .. }
            | ConsoleEvent::Exit { handle, .. }
            | ConsoleEvent::Subprocs { handle, .. }
            | ConsoleEvent::WorkingDirectory { handle, .. } => handle,
        }
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleEvent::Prompt { .. } => "prompt-detected",
            ConsoleEvent::Output { .. } => "output-produced",
            ConsoleEvent::Exit { .. } => "exit",
            ConsoleEvent::Subprocs { .. } => "child-process-presence-changed",
            ConsoleEvent::WorkingDirectory { .. } => "working-directory-changed",
        }
    }
}

/// Receives console events. Implemented outside the session core.
pub trait EventSink: Send + Sync {
    /// Deliver an event.
    fn notify(&self, event: ConsoleEvent);
}
