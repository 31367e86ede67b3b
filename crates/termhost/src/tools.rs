//! MCP Tool Types
//!
//! Parameter and response types for the console tools.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use termhost_core::{ChannelMode, ConsoleProcessInfo, InteractionMode, ShellType};
use termhost_session::ConsoleEvent;

// =============================================================================
// Creation Tools
// =============================================================================

/// Parameters for console_create_command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateCommandParams {
    /// Command line, run through the platform shell
    pub command: String,

    /// Display caption (defaults to the command)
    #[serde(default)]
    pub caption: Option<String>,

    /// Working directory
    #[serde(default)]
    pub cwd: Option<String>,

    /// Whether the command may prompt the user
    #[serde(default)]
    pub interaction: InteractionMode,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Parameters for console_create_program
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateProgramParams {
    /// Program to execute
    pub program: String,

    /// Program arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Display caption (defaults to the program)
    #[serde(default)]
    pub caption: Option<String>,

    /// Working directory
    #[serde(default)]
    pub cwd: Option<String>,

    /// Whether the program may prompt the user
    #[serde(default)]
    pub interaction: InteractionMode,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Parameters for console_create_terminal
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateTerminalParams {
    /// Handle of an earlier terminal to reattach to or relaunch
    #[serde(default)]
    pub handle: Option<String>,

    /// Display caption
    #[serde(default)]
    pub caption: Option<String>,

    /// Shell to run (defaults to the configured shell)
    #[serde(default)]
    pub shell_type: Option<ShellType>,

    /// Terminal rows
    #[serde(default)]
    pub rows: Option<u16>,

    /// Terminal columns
    #[serde(default)]
    pub cols: Option<u16>,

    /// Working directory (defaults to the home directory)
    #[serde(default)]
    pub cwd: Option<String>,

    /// Prefer the direct socket (defaults to the server setting)
    #[serde(default)]
    pub direct_socket: Option<bool>,
}

/// Response for the create tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateResponse {
    /// Process handle
    pub handle: String,

    /// Channel the process uses
    pub channel: ChannelMode,

    /// Whether a live process was reused
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub reattached: bool,

    /// Success message
    pub message: String,
}

// =============================================================================
// Process Control Tools
// =============================================================================

/// Parameters for tools that only name a process
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HandleParams {
    /// Process handle
    pub handle: String,
}

/// Parameters for console_send_input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SendInputParams {
    /// Process handle
    pub handle: String,

    /// Text to write
    #[serde(default)]
    pub text: String,

    /// Send an interrupt instead of text
    #[serde(default)]
    pub interrupt: bool,

    /// Echo the input into the transcript (line-oriented processes)
    #[serde(default)]
    pub echo: bool,

    /// Sequence number: -1 unordered, -2 flush, 0 and up ordered
    #[serde(default = "default_sequence")]
    pub sequence: i64,
}

fn default_sequence() -> i64 {
    -1
}

/// Parameters for console_resize
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResizeParams {
    /// Process handle
    pub handle: String,

    /// New column count
    pub cols: u16,

    /// New row count
    pub rows: u16,
}

/// Parameters for console_get_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetBufferParams {
    /// Process handle
    pub handle: String,

    /// Return only this chunk of the transcript
    #[serde(default)]
    pub chunk: Option<usize>,
}

/// Response for console_get_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetBufferResponse {
    /// Process handle
    pub handle: String,

    /// Transcript text
    pub output: String,

    /// More chunks follow
    pub more_available: bool,
}

/// Parameters for console_delete_log
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteLogParams {
    /// Process handle
    pub handle: String,

    /// Keep the last line
    #[serde(default)]
    pub last_line_only: bool,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AckResponse {
    /// Process handle
    pub handle: String,

    /// Success message
    pub message: String,
}

// =============================================================================
// Query Tools
// =============================================================================

/// Parameters for console_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {}

/// One process in console_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessSummary {
    /// Persisted record
    #[serde(flatten)]
    pub record: ConsoleProcessInfo,

    /// Whether the process has been started
    pub started: bool,

    /// Operating system pid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Channel name
    pub channel_name: String,

    /// Shell name
    pub shell_name: String,
}

/// Response for console_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListResponse {
    /// Known processes
    pub processes: Vec<ProcessSummary>,

    /// Total count
    pub count: usize,
}

/// Parameters for console_poll_events
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PollEventsParams {
    /// Only events for this process
    #[serde(default)]
    pub handle: Option<String>,

    /// Maximum number of events to return
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// How long to wait for the first event (milliseconds)
    #[serde(default)]
    pub timeout_ms: u64,
}

fn default_max_events() -> usize {
    100
}

/// Response for console_poll_events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollEventsResponse {
    /// Events, oldest first
    pub events: Vec<ConsoleEvent>,

    /// Number of events returned
    pub count: usize,

    /// Events still queued
    pub remaining: usize,
}
