//! Console process records.
//!
//! [`ConsoleProcessInfo`] is the persisted, serializable half of a console
//! process: everything that must survive a restart of the hosting server.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Dimensions, Error, Result, ShellType};

/// Longest handle a client may choose.
pub const MAX_HANDLE_LENGTH: usize = 128;

/// Client-visible line cap applied to output events by default.
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 1000;

/// Opaque identifier of a console process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConsoleHandle(String);

impl ConsoleHandle {
    /// Generate a new random handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a client-chosen handle.
    ///
    /// Handles name files in the state directory, so only ASCII letters,
    /// digits, `-` and `_` are accepted.
    pub fn parse(value: &str) -> Result<Self> {
        let handle = Self::from(value);
        if handle.is_well_formed() {
            Ok(handle)
        } else {
            Err(Error::InvalidInput(format!("invalid console handle: {value:?}")))
        }
    }

    /// Whether the handle is non-empty, bounded and made of `[A-Za-z0-9_-]`.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_HANDLE_LENGTH
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }

    /// Borrow the handle as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the handle has not been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ConsoleHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConsoleHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ConsoleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport used to move input and output between process and client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ChannelMode {
    /// Client pulls output and pushes input with one call per round trip
    #[default]
    RequestResponse,
    /// Standing socket connection; output is pushed as it is produced
    DirectSocket {
        /// Port the socket server listens on
        port: u16,
    },
}

impl ChannelMode {
    /// Short name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelMode::RequestResponse => "request-response",
            ChannelMode::DirectSocket { .. } => "direct-socket",
        }
    }

    /// Channel-specific address, if any.
    pub fn address(&self) -> Option<String> {
        match self {
            ChannelMode::RequestResponse => None,
            ChannelMode::DirectSocket { port } => Some(port.to_string()),
        }
    }

    /// Whether output is pushed over the direct socket.
    pub fn is_direct_socket(&self) -> bool {
        matches!(self, ChannelMode::DirectSocket { .. })
    }
}

/// Whether a process may interact with the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    /// Never interactive; runs over plain pipes
    Never,
    /// May prompt; gets a pseudo-terminal
    #[default]
    Possible,
    /// Always interactive; gets a pseudo-terminal
    Always,
}

impl InteractionMode {
    /// Whether a pseudo-terminal should be allocated.
    pub fn wants_pseudoterminal(&self) -> bool {
        !matches!(self, InteractionMode::Never)
    }
}

/// Persisted state of a console process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConsoleProcessInfo {
    /// Process handle
    pub handle: ConsoleHandle,
    /// Display caption
    pub caption: String,
    /// Requested (or, after launch, selected) shell type
    pub shell_type: ShellType,
    /// Last known working directory
    pub cwd: Option<PathBuf>,
    /// Declared terminal size
    pub dimensions: Dimensions,
    /// Terminal sequence id, exported to the shell environment
    pub terminal_sequence: Option<u32>,
    /// Active transport
    pub channel: ChannelMode,
    /// A full-screen program holds the alternate screen
    pub alt_buffer_active: bool,
    /// Reattach to a live process with the same handle when restarted
    pub allow_restart: bool,
    /// Exit code once the process has exited
    pub exit_code: Option<i32>,
    /// A child process is running under the shell
    pub has_child_procs: bool,
    /// Process has been abandoned; start() becomes a no-op
    pub zombie: bool,
    /// Set while a restart did not find a live process to reuse
    pub restarted: bool,
    /// Capture the shell environment with private commands
    pub track_env: bool,
    /// Interaction mode
    pub interaction_mode: InteractionMode,
    /// Line cap for client-visible output events
    pub max_output_lines: usize,
}

impl Default for ConsoleProcessInfo {
    fn default() -> Self {
        Self {
            handle: ConsoleHandle::default(),
            caption: String::new(),
            shell_type: ShellType::Default,
            cwd: None,
            dimensions: Dimensions::default(),
            terminal_sequence: None,
            channel: ChannelMode::RequestResponse,
            alt_buffer_active: false,
            allow_restart: false,
            exit_code: None,
            has_child_procs: false,
            zombie: false,
            restarted: false,
            track_env: false,
            interaction_mode: InteractionMode::Possible,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
        }
    }
}

impl ConsoleProcessInfo {
    /// Record for a command or program run.
    pub fn new(caption: impl Into<String>, interaction_mode: InteractionMode) -> Self {
        Self {
            caption: caption.into(),
            interaction_mode,
            ..Self::default()
        }
    }

    /// Record for an interactive terminal.
    pub fn terminal(
        caption: impl Into<String>,
        shell_type: ShellType,
        dimensions: Dimensions,
        terminal_sequence: u32,
    ) -> Self {
        Self {
            caption: caption.into(),
            shell_type,
            dimensions,
            terminal_sequence: Some(terminal_sequence),
            allow_restart: true,
            interaction_mode: InteractionMode::Always,
            ..Self::default()
        }
    }

    /// Assign a fresh handle if none has been assigned yet.
    pub fn ensure_handle(&mut self) -> &ConsoleHandle {
        if self.handle.is_empty() {
            self.handle = ConsoleHandle::generate();
        }
        &self.handle
    }
}
