//! Termhost MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! Tool calls are routed to the console process table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use termhost_core::{
    ConsoleHandle, ConsoleProcessInfo, Dimensions, Error, Input, Sequence, TerminalSettings,
};
use termhost_pty::ProcessOptions;
use termhost_session::{ConsoleProcess, ConsoleProcessTable};

use crate::events::EventQueue;
use crate::tools::*;

/// Longest a poll may wait for the first event.
const MAX_POLL_WAIT: Duration = Duration::from_secs(30);

/// Map a core error onto an MCP error.
fn to_mcp_error(e: Error) -> McpError {
    let code = match e {
        Error::ProcessNotFound(_)
        | Error::InvalidDimensions { .. }
        | Error::InvalidInput(_)
        | Error::ProcessZombie => -32602, // Invalid params
        _ => -32603, // Internal error
    };
    McpError::new(ErrorCode(code), e.to_string(), None)
}

fn json_result<T: Serialize>(response: &T, fallback: impl FnOnce() -> String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(response).unwrap_or_else(|_| fallback()),
    )])
}

fn process_options(cwd: Option<String>, env: &HashMap<String, String>) -> ProcessOptions {
    let mut options = ProcessOptions {
        working_dir: cwd.map(PathBuf::from),
        ..Default::default()
    };
    for (key, value) in env {
        options.set_env(key.clone(), value.clone());
    }
    options
}

/// Termhost MCP Server
///
/// Exposes console processes via MCP tools.
#[derive(Clone)]
pub struct TermhostServer {
    /// Console processes
    table: Arc<ConsoleProcessTable>,
    /// Events for the request/response channel
    events: Arc<EventQueue>,
    /// Terminal defaults
    settings: Arc<TerminalSettings>,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TermhostServer {
    /// Create a server over `table`, delivering request/response events from `events`.
    pub fn new(
        table: Arc<ConsoleProcessTable>,
        events: Arc<EventQueue>,
        settings: TerminalSettings,
    ) -> Self {
        Self {
            table,
            events,
            settings: Arc::new(settings),
            tool_router: Self::tool_router(),
        }
    }

    fn process(&self, handle: &str) -> Result<Arc<ConsoleProcess>, McpError> {
        self.table
            .get(&ConsoleHandle::from(handle))
            .map_err(to_mcp_error)
    }

    fn created(process: &ConsoleProcess, reattached: bool) -> CreateResponse {
        let record = process.to_record();
        CreateResponse {
            handle: record.handle.to_string(),
            channel: record.channel,
            reattached,
            message: format!(
                "Console '{}' {} ({})",
                record.caption,
                if reattached { "reattached" } else { "created" },
                record.channel.name()
            ),
        }
    }

    /// Create a command console.
    pub fn create_command(&self, params: CreateCommandParams) -> Result<CreateResponse, McpError> {
        let mut info = ConsoleProcessInfo::new(
            params.caption.clone().unwrap_or_else(|| params.command.clone()),
            params.interaction,
        );
        info.cwd = params.cwd.clone().map(PathBuf::from);
        let options = process_options(params.cwd, &params.env);

        let process = self
            .table
            .create_command(params.command, options, info)
            .map_err(|e| {
                error!("Failed to create command console: {}", e);
                to_mcp_error(e)
            })?;
        Ok(Self::created(&process, false))
    }

    /// Create a program console.
    pub fn create_program(&self, params: CreateProgramParams) -> Result<CreateResponse, McpError> {
        let mut info = ConsoleProcessInfo::new(
            params.caption.clone().unwrap_or_else(|| params.program.clone()),
            params.interaction,
        );
        info.cwd = params.cwd.clone().map(PathBuf::from);
        let options = process_options(params.cwd, &params.env);

        let process = self
            .table
            .create_program(params.program, params.args, options, info)
            .map_err(|e| {
                error!("Failed to create program console: {}", e);
                to_mcp_error(e)
            })?;
        Ok(Self::created(&process, false))
    }

    /// Create a terminal, or reattach to the one under `params.handle`.
    pub fn create_terminal(&self, params: CreateTerminalParams) -> Result<CreateResponse, McpError> {
        let enable_socket = params
            .direct_socket
            .unwrap_or_else(|| self.table.direct_socket_enabled());
        let requested = params
            .handle
            .filter(|handle| !handle.is_empty())
            .map(|handle| ConsoleHandle::parse(&handle))
            .transpose()
            .map_err(|e| {
                warn!("Rejected terminal handle: {}", e);
                to_mcp_error(e)
            })?;

        if let Some(existing) = requested.as_ref().and_then(|h| self.table.find_by_handle(h)) {
            let was_live = existing.is_live();
            let process = self
                .table
                .create_terminal_process_from(&existing.handle(), enable_socket)
                .map_err(to_mcp_error)?;
            let reattached = was_live && Arc::ptr_eq(&existing, &process);
            return Ok(Self::created(&process, reattached));
        }

        let dimensions = Dimensions::new(
            params.rows.unwrap_or(self.settings.default_rows),
            params.cols.unwrap_or(self.settings.default_cols),
        );
        if !dimensions.is_valid() {
            return Err(to_mcp_error(Error::InvalidDimensions {
                rows: dimensions.rows,
                cols: dimensions.cols,
            }));
        }

        let sequence = self.table.next_terminal_sequence();
        let mut info = ConsoleProcessInfo::terminal(
            params
                .caption
                .unwrap_or_else(|| format!("Terminal {sequence}")),
            params.shell_type.unwrap_or(self.settings.default_shell),
            dimensions,
            sequence,
        );
        info.cwd = params.cwd.map(PathBuf::from);
        if let Some(handle) = requested {
            // keep a handle the client persisted across server restarts
            info.handle = handle;
        }

        let (options, shell) = self.table.create_terminal_proc_options(&mut info);
        let process = self
            .table
            .create_terminal_process(options, info, shell, enable_socket)
            .map_err(|e| {
                error!("Failed to create terminal: {}", e);
                to_mcp_error(e)
            })?;
        Ok(Self::created(&process, false))
    }

    /// Queue input for a console.
    pub fn send_input(&self, params: SendInputParams) -> Result<AckResponse, McpError> {
        let process = self.process(&params.handle)?;
        let sequence = Sequence::from_wire(params.sequence).map_err(to_mcp_error)?;

        let input = if params.interrupt {
            Input::interrupt()
        } else {
            Input::text(params.text)
        };
        process.enqueue_input(input.with_sequence(sequence).with_echo(params.echo));

        Ok(AckResponse {
            handle: params.handle,
            message: "Input queued".to_string(),
        })
    }

    /// Read the transcript, whole or one chunk.
    pub fn get_buffer(&self, params: GetBufferParams) -> Result<GetBufferResponse, McpError> {
        let process = self.process(&params.handle)?;
        let (output, more_available) = match params.chunk {
            Some(index) => process.get_buffer_chunk(index),
            None => (process.get_buffer(), false),
        };
        Ok(GetBufferResponse {
            handle: params.handle,
            output,
            more_available,
        })
    }

    /// Summaries of every console.
    pub fn list(&self) -> ListResponse {
        let processes: Vec<ProcessSummary> = self
            .table
            .list()
            .into_iter()
            .filter_map(|record| self.table.find_by_handle(&record.handle))
            .map(|process| ProcessSummary {
                record: process.to_record(),
                started: process.is_started(),
                pid: process.pid(),
                channel_name: process.channel_mode_name().to_string(),
                shell_name: process.shell_name().to_string(),
            })
            .collect();
        let count = processes.len();
        ListResponse { processes, count }
    }

    /// Take queued events, waiting up to `timeout_ms` for the first one.
    pub async fn poll_events(&self, params: PollEventsParams) -> PollEventsResponse {
        let handle = params.handle.map(ConsoleHandle::from);
        let timeout = Duration::from_millis(params.timeout_ms).min(MAX_POLL_WAIT);

        self.events.wait(handle.as_ref(), timeout).await;

        let events = self.events.drain(handle.as_ref(), params.max_events);
        let count = events.len();
        PollEventsResponse {
            events,
            count,
            remaining: self.events.pending(handle.as_ref()),
        }
    }

    /// Create a console that runs a command line
    #[tool(description = "Create a console that runs a command line through the platform shell")]
    #[instrument(skip_all)]
    async fn console_create_command(
        &self,
        Parameters(params): Parameters<CreateCommandParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Creating command console: command='{}'", params.command);
        let response = self.create_command(params)?;
        Ok(json_result(&response, || response.handle.clone()))
    }

    /// Create a console that runs a program
    #[tool(description = "Create a console that runs a program with an argument list")]
    #[instrument(skip_all)]
    async fn console_create_program(
        &self,
        Parameters(params): Parameters<CreateProgramParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Creating program console: program='{}', args={:?}",
            params.program, params.args
        );
        let response = self.create_program(params)?;
        Ok(json_result(&response, || response.handle.clone()))
    }

    /// Create or reattach to an interactive terminal
    #[tool(
        description = "Create an interactive terminal, or reattach to a running one by handle"
    )]
    #[instrument(skip_all)]
    async fn console_create_terminal(
        &self,
        Parameters(params): Parameters<CreateTerminalParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Creating terminal: handle={:?}, shell={:?}",
            params.handle, params.shell_type
        );
        let response = self.create_terminal(params)?;
        Ok(json_result(&response, || response.handle.clone()))
    }

    /// Start a console
    #[tool(description = "Start a created console. Does nothing if already started")]
    #[instrument(skip_all)]
    async fn console_start(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Starting console: handle={}", params.handle);
        let process = self.process(&params.handle)?;
        process.start().map_err(|e| {
            error!("Failed to start console {}: {}", params.handle, e);
            to_mcp_error(e)
        })?;

        let response = AckResponse {
            handle: params.handle.clone(),
            message: "Console started".to_string(),
        };
        Ok(json_result(&response, || "Console started".to_string()))
    }

    /// Send input to a console
    #[tool(
        description = "Queue input for a console. Use sequence numbers from 0 to order input; -1 is unordered, -2 flushes"
    )]
    #[instrument(skip_all)]
    async fn console_send_input(
        &self,
        Parameters(params): Parameters<SendInputParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Sending input: handle={}, sequence={}, interrupt={}, bytes={}",
            params.handle,
            params.sequence,
            params.interrupt,
            params.text.len()
        );
        let response = self.send_input(params)?;
        Ok(json_result(&response, || "Input queued".to_string()))
    }

    /// Stop a console
    #[tool(description = "Stop a console's process")]
    #[instrument(skip_all)]
    async fn console_interrupt(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Interrupting console: handle={}", params.handle);
        self.process(&params.handle)?.interrupt();
        let response = AckResponse {
            handle: params.handle,
            message: "Interrupt requested".to_string(),
        };
        Ok(json_result(&response, || "Interrupt requested".to_string()))
    }

    /// Interrupt the foreground job
    #[tool(description = "Interrupt the foreground job running under a terminal's shell")]
    #[instrument(skip_all)]
    async fn console_interrupt_child(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Interrupting foreground job: handle={}", params.handle);
        self.process(&params.handle)?.interrupt_child();
        let response = AckResponse {
            handle: params.handle,
            message: "Interrupt requested".to_string(),
        };
        Ok(json_result(&response, || "Interrupt requested".to_string()))
    }

    /// Resize a console
    #[tool(description = "Resize a console's terminal. Applied on the next tick")]
    #[instrument(skip_all)]
    async fn console_resize(
        &self,
        Parameters(params): Parameters<ResizeParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Resizing console: handle={}, cols={}, rows={}",
            params.handle, params.cols, params.rows
        );
        self.process(&params.handle)?
            .resize(params.cols, params.rows)
            .map_err(to_mcp_error)?;
        let response = AckResponse {
            handle: params.handle,
            message: format!("Resize to {}x{} requested", params.cols, params.rows),
        };
        Ok(json_result(&response, || "Resize requested".to_string()))
    }

    /// Read a console's transcript
    #[tool(description = "Read a console's saved transcript, whole or in chunks")]
    #[instrument(skip_all)]
    async fn console_get_buffer(
        &self,
        Parameters(params): Parameters<GetBufferParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Reading transcript: handle={}, chunk={:?}",
            params.handle, params.chunk
        );
        let response = self.get_buffer(params)?;
        Ok(json_result(&response, || response.output.clone()))
    }

    /// Clear a console's transcript
    #[tool(description = "Clear a console's transcript, optionally keeping the last line")]
    #[instrument(skip_all)]
    async fn console_delete_log(
        &self,
        Parameters(params): Parameters<DeleteLogParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Clearing transcript: handle={}, last_line_only={}",
            params.handle, params.last_line_only
        );
        self.process(&params.handle)?
            .delete_log(params.last_line_only);
        self.table.save();
        let response = AckResponse {
            handle: params.handle,
            message: "Transcript cleared".to_string(),
        };
        Ok(json_result(&response, || "Transcript cleared".to_string()))
    }

    /// Switch a console to request/response
    #[tool(
        description = "Stop using the direct socket for a console; output is then delivered through console_poll_events"
    )]
    #[instrument(skip_all)]
    async fn console_use_request_response(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Switching to request/response: handle={}", params.handle);
        self.process(&params.handle)?.set_rpc_mode();
        self.table.save();
        let response = AckResponse {
            handle: params.handle,
            message: "Using request/response".to_string(),
        };
        Ok(json_result(&response, || "Using request/response".to_string()))
    }

    /// Abandon a console
    #[tool(description = "Mark a console as abandoned so it is never started again")]
    #[instrument(skip_all)]
    async fn console_set_zombie(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Marking console as zombie: handle={}", params.handle);
        self.process(&params.handle)?.set_zombie();
        let response = AckResponse {
            handle: params.handle,
            message: "Console marked as zombie".to_string(),
        };
        Ok(json_result(&response, || "Console marked as zombie".to_string()))
    }

    /// Remove a console
    #[tool(description = "Stop a console and forget it")]
    #[instrument(skip_all)]
    async fn console_remove(
        &self,
        Parameters(params): Parameters<HandleParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Removing console: handle={}", params.handle);
        self.table
            .remove(&ConsoleHandle::from(params.handle.as_str()))
            .map_err(to_mcp_error)?;
        let response = AckResponse {
            handle: params.handle,
            message: "Console removed".to_string(),
        };
        Ok(json_result(&response, || "Console removed".to_string()))
    }

    /// List consoles
    #[tool(description = "List all consoles with their persisted state")]
    #[instrument(skip_all)]
    async fn console_list(
        &self,
        Parameters(_params): Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.list();
        info!("Found {} console(s)", response.count);
        Ok(json_result(&response, || format!("{} consoles", response.count)))
    }

    /// Poll console events
    #[tool(
        description = "Take queued console events (output, prompts, exits, working directory and child process changes)"
    )]
    #[instrument(skip_all)]
    async fn console_poll_events(
        &self,
        Parameters(params): Parameters<PollEventsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Polling events: handle={:?}, max={}, timeout_ms={}",
            params.handle, params.max_events, params.timeout_ms
        );
        let response = self.poll_events(params).await;
        Ok(json_result(&response, || format!("{} events", response.count)))
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for TermhostServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Termhost - console sessions over MCP. \
                 Create a console with console_create_command, console_create_program or \
                 console_create_terminal, then console_start it. Send input with \
                 console_send_input and collect output, prompts and exits with \
                 console_poll_events."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhost_core::{ChannelMode, InteractionMode, Result, ServerConfig};
    use termhost_pty::PtySupervisor;
    use termhost_session::{ChannelRegistry, ConsoleEvent, EventSink, SocketCallbacks};

    struct NoSocket;

    impl ChannelRegistry for NoSocket {
        fn ensure_server_running(&self) -> Result<()> {
            Err(Error::ChannelError("disabled".to_string()))
        }

        fn listen(&self, _: &ConsoleHandle, _: Arc<dyn SocketCallbacks>) -> Result<()> {
            Ok(())
        }

        fn stop_listening(&self, _: &ConsoleHandle) {}

        fn send_text(&self, _: &ConsoleHandle, _: &str) {}

        fn port(&self) -> u16 {
            0
        }
    }

    fn server() -> TermhostServer {
        let config = ServerConfig::default();
        let events = Arc::new(EventQueue::default());
        let table = Arc::new(ConsoleProcessTable::new(
            &config,
            Arc::new(PtySupervisor::default()),
            Arc::new(NoSocket),
            events.clone(),
            None,
        ));
        TermhostServer::new(table, events, config.terminal)
    }

    fn command_params(command: &str) -> CreateCommandParams {
        CreateCommandParams {
            command: command.to_string(),
            caption: None,
            cwd: None,
            interaction: InteractionMode::Never,
            env: Default::default(),
        }
    }

    #[test]
    fn test_error_codes() {
        let not_found = to_mcp_error(Error::ProcessNotFound(ConsoleHandle::from("x")));
        assert_eq!(not_found.code, ErrorCode(-32602));
        let launch = to_mcp_error(Error::LaunchFailed("no shell".to_string()));
        assert_eq!(launch.code, ErrorCode(-32603));
    }

    #[test]
    fn test_create_and_list() {
        let server = server();
        let created = server.create_command(command_params("make all")).unwrap();
        assert_eq!(created.channel, ChannelMode::RequestResponse);
        assert!(!created.reattached);

        let listed = server.list();
        assert_eq!(listed.count, 1);
        assert_eq!(listed.processes[0].record.caption, "make all");
        assert!(!listed.processes[0].started);
        assert_eq!(listed.processes[0].channel_name, "request-response");
    }

    #[test]
    fn test_unknown_handle() {
        let server = server();
        let result = server.get_buffer(GetBufferParams {
            handle: "missing".to_string(),
            chunk: None,
        });
        assert!(matches!(result, Err(e) if e.code == ErrorCode(-32602)));
    }

    #[test]
    fn test_send_input_rejects_bad_sequence() {
        let server = server();
        let created = server.create_command(command_params("cat")).unwrap();
        let result = server.send_input(SendInputParams {
            handle: created.handle,
            text: "x".to_string(),
            interrupt: false,
            echo: false,
            sequence: -7,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_create_terminal_rejects_zero_size() {
        let server = server();
        let result = server.create_terminal(CreateTerminalParams {
            handle: None,
            caption: None,
            shell_type: None,
            rows: Some(0),
            cols: Some(80),
            cwd: None,
            direct_socket: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_create_terminal_keeps_requested_handle() {
        let server = server();
        let created = server
            .create_terminal(CreateTerminalParams {
                handle: Some("persisted".to_string()),
                caption: None,
                shell_type: None,
                rows: None,
                cols: None,
                cwd: None,
                direct_socket: Some(true),
            })
            .unwrap();
        assert_eq!(created.handle, "persisted");
        // the socket server is unavailable, so the terminal falls back
        assert_eq!(created.channel, ChannelMode::RequestResponse);
    }

    #[test]
    fn test_create_terminal_rejects_path_like_handle() {
        let server = server();
        for handle in ["../../escaped", "a/b", ".."] {
            let result = server.create_terminal(CreateTerminalParams {
                handle: Some(handle.to_string()),
                caption: None,
                shell_type: None,
                rows: None,
                cols: None,
                cwd: None,
                direct_socket: None,
            });
            assert!(matches!(result, Err(e) if e.code == ErrorCode(-32602)), "{handle}");
        }
        assert_eq!(server.list().count, 0);
    }

    #[tokio::test]
    async fn test_poll_events_filters_by_handle() {
        let server = server();
        server.events.notify(ConsoleEvent::Output {
            handle: ConsoleHandle::from("a"),
            output: "one\n".to_string(),
        });
        server.events.notify(ConsoleEvent::Output {
            handle: ConsoleHandle::from("b"),
            output: "two\n".to_string(),
        });

        let response = server
            .poll_events(PollEventsParams {
                handle: Some("b".to_string()),
                max_events: 10,
                timeout_ms: 0,
            })
            .await;
        assert_eq!(response.count, 1);
        assert_eq!(response.remaining, 0);
        assert_eq!(server.events.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_events_waits_past_other_consoles() {
        let server = server();
        server.events.notify(ConsoleEvent::Output {
            handle: ConsoleHandle::from("b"),
            output: "noise\n".to_string(),
        });

        let started = std::time::Instant::now();
        let response = server
            .poll_events(PollEventsParams {
                handle: Some("a".to_string()),
                max_events: 10,
                timeout_ms: 100,
            })
            .await;
        assert_eq!(response.count, 0);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(server.events.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_command_round_trip() {
        let server = server();
        let created = server.create_command(command_params("echo hi")).unwrap();
        server.process(&created.handle).unwrap().start().unwrap();

        let mut output = String::new();
        let mut exited = false;
        for _ in 0..50 {
            let response = server
                .poll_events(PollEventsParams {
                    handle: Some(created.handle.clone()),
                    max_events: 100,
                    timeout_ms: 200,
                })
                .await;
            for event in response.events {
                match event {
                    ConsoleEvent::Output { output: text, .. } => output.push_str(&text),
                    ConsoleEvent::Exit { exit_code, .. } => {
                        assert_eq!(exit_code, 0);
                        exited = true;
                    }
                    _ => {}
                }
            }
            if exited {
                break;
            }
        }

        assert!(exited);
        assert!(output.contains("hi\n"));
    }
}
