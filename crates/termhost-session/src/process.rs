//! Console process lifecycle, input draining and output processing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use termhost_core::{
    AvailableShells, ChannelMode, ConsoleHandle, ConsoleProcessInfo, Dimensions, Error, Input,
    Result, TerminalSettings, TerminalShell,
};
use termhost_pty::{Launch, ProcessCallbacks, ProcessOperations, ProcessOptions, ProcessSupervisor};

use crate::channel::ChannelRegistry;
use crate::events::{ConsoleEvent, EventSink};
use crate::output::{trim_leading_lines, OutputBuffer};
use crate::private_command::{PrivateCommandLoop, PrivateCommandTick};
use crate::prompt::{classify_fragment, normalize_line_endings, split_output, FragmentKind};
use crate::sequencer::InputSequencer;
use crate::store::StateSaver;

/// Collaborators shared by every console process.
#[derive(Clone)]
pub struct ConsoleContext {
    /// Spawns children
    pub supervisor: Arc<dyn ProcessSupervisor>,
    /// Direct-socket server
    pub channels: Arc<dyn ChannelRegistry>,
    /// Event delivery
    pub events: Arc<dyn EventSink>,
    /// Persistence
    pub saver: Arc<dyn StateSaver>,
    /// Terminal settings
    pub settings: TerminalSettings,
}

/// What a console process runs. Exactly one shape per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchShape {
    /// A command line run through the platform shell
    Command(String),
    /// A program with an argument vector
    Program {
        /// Program path
        program: PathBuf,
        /// Arguments
        args: Vec<String>,
    },
    /// An interactive terminal shell
    Terminal {
        /// Preferred shell (resolved again at start if missing)
        shell: Option<TerminalShell>,
    },
}

/// What a prompt handler wants done with a detected prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAction {
    /// Not handled; notify the client
    PassThrough,
    /// Answer the prompt with this input (empty input terminates)
    Respond(Input),
    /// Terminate the process
    Terminate,
}

/// Custom prompt handling, consulted before the client sees a prompt.
pub type PromptHandler = Box<dyn Fn(&str) -> PromptAction + Send + Sync>;

/// Invoked once when the process exits.
pub type ExitHandler = Box<dyn FnOnce(i32) + Send>;

#[derive(Debug)]
struct InputState {
    /// Input has been written since the last Enter
    pending_command: bool,
    last_enter: Option<Instant>,
}

/// One shell, command or program, with its transcript and channel.
///
/// The continuation tick runs on the supervising thread. Socket input arrives
/// on other threads and only touches the sequencer and the weak operations
/// handle; the `input_state` lock serializes drainers.
pub struct ConsoleProcess {
    me: Weak<ConsoleProcess>,
    launch: LaunchShape,
    options: ProcessOptions,
    info: Mutex<ConsoleProcessInfo>,
    output: Mutex<OutputBuffer>,
    sequencer: InputSequencer,
    input_state: Mutex<InputState>,
    private_command: Mutex<PrivateCommandLoop>,
    ops: Mutex<Option<Weak<dyn ProcessOperations>>>,
    interrupt: AtomicBool,
    interrupt_child: AtomicBool,
    started: AtomicBool,
    child_procs_sent: AtomicBool,
    pending_resize: Mutex<Option<Dimensions>>,
    pid: Mutex<Option<u32>>,
    prompt_handler: Mutex<Option<PromptHandler>>,
    exit_handler: Mutex<Option<ExitHandler>>,
    context: ConsoleContext,
}

impl std::fmt::Debug for ConsoleProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProcess")
            .field("handle", &self.handle())
            .field("launch", &self.launch)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl ConsoleProcess {
    /// Create a process that runs `command` through the platform shell.
    pub fn create_command(
        command: impl Into<String>,
        options: ProcessOptions,
        info: ConsoleProcessInfo,
        context: ConsoleContext,
    ) -> Arc<Self> {
        Self::build(LaunchShape::Command(command.into()), options, info, context)
    }

    /// Create a process that runs `program` with `args`.
    pub fn create_program(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        options: ProcessOptions,
        info: ConsoleProcessInfo,
        context: ConsoleContext,
    ) -> Arc<Self> {
        let launch = LaunchShape::Program {
            program: program.into(),
            args,
        };
        Self::build(launch, options, info, context)
    }

    /// Create an interactive terminal.
    pub fn create_terminal(
        shell: Option<TerminalShell>,
        options: ProcessOptions,
        info: ConsoleProcessInfo,
        context: ConsoleContext,
    ) -> Arc<Self> {
        Self::build(LaunchShape::Terminal { shell }, options, info, context)
    }

    /// Rebuild a process from its persisted record and transcript.
    ///
    /// The result is not started; relaunch it as a terminal.
    pub fn from_record(
        info: ConsoleProcessInfo,
        buffer: Option<String>,
        context: ConsoleContext,
    ) -> Arc<Self> {
        let mut output =
            OutputBuffer::with_contents(context.settings.buffer_limit, buffer.unwrap_or_default());
        output.set_alt_buffer_active(info.alt_buffer_active);

        let options = ProcessOptions {
            smart_terminal: true,
            ..Default::default()
        };
        Self::assemble(LaunchShape::Terminal { shell: None }, options, info, output, context)
    }

    fn build(
        launch: LaunchShape,
        mut options: ProcessOptions,
        mut info: ConsoleProcessInfo,
        context: ConsoleContext,
    ) -> Arc<Self> {
        info.ensure_handle();

        // interleave stderr with stdout
        options.redirect_stderr_to_stdout = true;

        if info.interaction_mode.wants_pseudoterminal() {
            options.pseudoterminal = Some(info.dimensions);
            let term = if options.smart_terminal {
                context.settings.smart_term.clone()
            } else {
                context.settings.dumb_term.clone()
            };
            options.set_env("TERM", term);
        }

        let mut output = OutputBuffer::new(context.settings.buffer_limit);
        output.set_alt_buffer_active(info.alt_buffer_active);
        if !options.smart_terminal {
            // the first line read back from the transcript is always complete
            output.append("\n");
        }

        Self::assemble(launch, options, info, output, context)
    }

    fn assemble(
        launch: LaunchShape,
        options: ProcessOptions,
        info: ConsoleProcessInfo,
        output: OutputBuffer,
        context: ConsoleContext,
    ) -> Arc<Self> {
        debug!(
            "Creating console process: handle={}, launch={:?}, smart={}",
            info.handle, launch, options.smart_terminal
        );

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            launch,
            options,
            info: Mutex::new(info),
            output: Mutex::new(output),
            sequencer: InputSequencer::new(),
            input_state: Mutex::new(InputState {
                pending_command: true,
                last_enter: None,
            }),
            private_command: Mutex::new(PrivateCommandLoop::new()),
            ops: Mutex::new(None),
            interrupt: AtomicBool::new(false),
            interrupt_child: AtomicBool::new(false),
            started: AtomicBool::new(false),
            child_procs_sent: AtomicBool::new(false),
            pending_resize: Mutex::new(None),
            pid: Mutex::new(None),
            prompt_handler: Mutex::new(None),
            exit_handler: Mutex::new(None),
            context,
        })
    }

    /// Launch the process. Does nothing if already started or a zombie.
    pub fn start(&self) -> Result<()> {
        if self.is_started() || self.info.lock().zombie {
            return Ok(());
        }

        let launch = match &self.launch {
            LaunchShape::Command(command) => Launch::Command(command.clone()),
            LaunchShape::Program { program, args } => Launch::Program {
                program: program.clone(),
                args: args.clone(),
            },
            LaunchShape::Terminal { shell } => {
                let shell = self.resolve_shell(shell.as_ref())?;
                Launch::Program {
                    program: shell.path,
                    args: shell.args,
                }
            }
        };

        let callbacks: Arc<dyn ProcessCallbacks> = self
            .me
            .upgrade()
            .ok_or_else(|| Error::Other("console process is shutting down".to_string()))?;

        info!(
            "Starting console process: handle={}, launch='{}'",
            self.handle(),
            launch.describe()
        );
        self.context
            .supervisor
            .spawn(launch, self.options.clone(), callbacks)?;
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resolve_shell(&self, preferred: Option<&TerminalShell>) -> Result<TerminalShell> {
        if let Some(shell) = preferred.filter(|shell| shell.exists()) {
            return Ok(shell.clone());
        }

        let shell_type = self.info.lock().shell_type;
        AvailableShells::detect()
            .get_info(shell_type)
            .filter(TerminalShell::exists)
            .or_else(AvailableShells::system_shell)
            .ok_or_else(|| {
                Error::LaunchFailed(format!("no usable shell found for '{shell_type}'"))
            })
    }

    /// Queue input. It is written on the next tick.
    pub fn enqueue_input(&self, input: Input) {
        debug!(
            "Queueing input: handle={}, sequence={:?}, bytes={}",
            self.handle(),
            input.sequence,
            input.text.len()
        );
        self.sequencer.enqueue(input);
    }

    /// Input from the direct socket: queue it and drain right away.
    ///
    /// If the process is gone, or a private command is running, the input
    /// stays queued for the next tick.
    pub fn receive_input(&self, text: &str) {
        self.sequencer.enqueue(Input::text(text));

        let Some(ops) = self.live_ops() else {
            return;
        };

        let mut state = self.input_state.lock();
        if self.private_command.lock().is_in_flight() {
            return;
        }
        self.drain_input(&mut state, ops.as_ref());
    }

    fn live_ops(&self) -> Option<Arc<dyn ProcessOperations>> {
        self.ops.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Stop the process on the next tick.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Interrupt the shell's foreground job on the next tick.
    pub fn interrupt_child(&self) {
        self.interrupt_child.store(true, Ordering::SeqCst);
    }

    /// Request a resize. Applied (and persisted) on the next tick.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let dimensions = Dimensions::new(rows, cols);
        if !dimensions.is_valid() {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        *self.pending_resize.lock() = Some(dimensions);
        Ok(())
    }

    /// Install a prompt handler.
    pub fn set_prompt_handler(&self, handler: PromptHandler) {
        *self.prompt_handler.lock() = Some(handler);
    }

    /// Install the exit handler.
    pub fn set_exit_handler(&self, handler: ExitHandler) {
        *self.exit_handler.lock() = Some(handler);
    }

    /// Switch to request/response, dropping the socket registration.
    pub fn set_rpc_mode(&self) {
        let handle = self.handle();
        info!("Switching to request/response: handle={}", handle);
        self.context.channels.stop_listening(&handle);
        self.info.lock().channel = ChannelMode::RequestResponse;
    }

    pub(crate) fn set_channel(&self, channel: ChannelMode) {
        self.info.lock().channel = channel;
    }

    /// Drop the socket registration, keeping the channel mode.
    pub fn stop_listening(&self) {
        self.context.channels.stop_listening(&self.handle());
    }

    /// Mark the process abandoned.
    pub fn set_zombie(&self) {
        {
            let mut info = self.info.lock();
            info.zombie = true;
            info.has_child_procs = false;
        }
        self.save_state();
    }

    /// Reuse this live process for a reattaching client.
    pub(crate) fn reattach(&self, channel: ChannelMode) {
        let alt_buffer_active = {
            let mut info = self.info.lock();
            info.restarted = false;
            info.channel = channel;
            info.alt_buffer_active
        };

        if alt_buffer_active {
            // Nudge the full-screen program into redrawing; the client follows
            // up with its real size.
            let jiggle = Dimensions::jiggle();
            if let Err(e) = self.resize(jiggle.cols, jiggle.rows) {
                warn!("Failed to request redraw resize: handle={}, error={}", self.handle(), e);
            }
        }
    }

    /// Replace the transcript with one saved from an earlier process.
    pub(crate) fn replace_buffer(&self, contents: String) {
        let active = self.info.lock().alt_buffer_active;
        let mut output = OutputBuffer::with_contents(self.context.settings.buffer_limit, contents);
        output.set_alt_buffer_active(active);
        *self.output.lock() = output;
    }

    pub(crate) fn set_alt_buffer_active(&self, active: bool) {
        self.info.lock().alt_buffer_active = active;
        self.output.lock().set_alt_buffer_active(active);
    }

    /// Process handle.
    pub fn handle(&self) -> ConsoleHandle {
        self.info.lock().handle.clone()
    }

    /// Snapshot of the persisted record.
    pub fn to_record(&self) -> ConsoleProcessInfo {
        self.info.lock().clone()
    }

    /// What the process runs.
    pub fn launch(&self) -> &LaunchShape {
        &self.launch
    }

    /// Options the process is spawned with.
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Whether `start` has launched the process.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Started, not exited and not a zombie.
    pub fn is_live(&self) -> bool {
        if !self.is_started() {
            return false;
        }
        let info = self.info.lock();
        info.exit_code.is_none() && !info.zombie
    }

    /// Operating system pid, as of the last tick.
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    /// Whether the process does its own terminal emulation.
    pub fn is_smart_terminal(&self) -> bool {
        self.options.smart_terminal
    }

    /// The full transcript.
    pub fn get_buffer(&self) -> String {
        self.output.lock().contents().to_string()
    }

    /// One chunk of the transcript and whether more follow.
    pub fn get_buffer_chunk(&self, index: usize) -> (String, bool) {
        self.output.lock().chunk(index)
    }

    /// Clear the transcript, or keep only its last line.
    pub fn delete_log(&self, last_line_only: bool) {
        let mut output = self.output.lock();
        if last_line_only {
            output.keep_last_line();
        } else {
            output.clear();
        }
    }

    /// Transcript for line-oriented processes; empty for smart terminals.
    pub fn buffered_output(&self) -> String {
        if self.options.smart_terminal {
            return String::new();
        }
        self.get_buffer()
    }

    /// Name of the active channel.
    pub fn channel_mode_name(&self) -> &'static str {
        self.info.lock().channel.name()
    }

    /// Display name of the shell type.
    pub fn shell_name(&self) -> &'static str {
        self.info.lock().shell_type.name()
    }

    /// Raw environment captured by the last private command.
    pub fn last_captured_environment(&self) -> Option<String> {
        self.private_command
            .lock()
            .last_environment()
            .map(str::to_string)
    }

    fn save_state(&self) {
        self.context.saver.save_state();
    }

    /// Returns `true` while a private command holds input back.
    fn private_command_tick(&self, ops: &dyn ProcessOperations) -> bool {
        let (track_env, has_child_procs) = {
            let info = self.info.lock();
            (info.track_env, info.has_child_procs)
        };
        if !track_env || has_child_procs {
            return false;
        }

        let outcome = {
            let state = self.input_state.lock();
            self.private_command.lock().tick(
                Instant::now(),
                state.pending_command,
                state.last_enter,
                ops,
            )
        };

        match outcome {
            PrivateCommandTick::Idle => false,
            PrivateCommandTick::Busy => true,
            PrivateCommandTick::TimedOut(captured) => {
                if !captured.is_empty() {
                    self.process_output(ops, &captured);
                }
                false
            }
        }
    }

    /// Write every deliverable input to the process.
    fn drain_input(&self, state: &mut InputState, ops: &dyn ProcessOperations) {
        let smart = self.options.smart_terminal;

        while let Some(input) = self.sequencer.dequeue() {
            state.pending_command = true;

            if input.interrupt {
                if let Err(e) = ops.pty_interrupt() {
                    warn!("Failed to interrupt: handle={}, error={}", self.handle(), e);
                }
                if input.echo_input && !smart {
                    self.output.lock().append("^C");
                }
                continue;
            }

            if input.submits_command() {
                state.last_enter = Some(Instant::now());
                state.pending_command = false;
            }

            if let Err(e) = ops.write_to_stdin(&input.text, false) {
                warn!("Failed to write input: handle={}, error={}", self.handle(), e);
            }

            // smart terminals echo through the pty
            if !smart {
                let echo = if input.echo_input { input.text.as_str() } else { "\n" };
                self.output.lock().append(echo);
            }
        }
    }

    fn process_output(&self, ops: &dyn ProcessOperations, output: &str) {
        if self.options.smart_terminal {
            self.commit_output(output);
            return;
        }

        let normalized = normalize_line_endings(output);
        let split = split_output(&normalized);
        if !split.committed.is_empty() {
            self.commit_output(split.committed);
        }
        if !split.fragment.is_empty() {
            match classify_fragment(split.fragment) {
                FragmentKind::Output => self.commit_output(split.fragment),
                FragmentKind::Prompt => self.handle_prompt(ops, split.fragment),
            }
        }
    }

    fn handle_prompt(&self, ops: &dyn ProcessOperations, prompt: &str) {
        let action = match self.prompt_handler.lock().as_ref() {
            Some(handler) => handler(prompt),
            None => PromptAction::PassThrough,
        };

        match action {
            PromptAction::Respond(input) if !input.is_empty() => self.enqueue_input(input),
            PromptAction::Respond(_) | PromptAction::Terminate => {
                debug!("Prompt handler declined, terminating: handle={}", self.handle());
                if let Err(e) = ops.terminate() {
                    warn!("Failed to terminate: handle={}, error={}", self.handle(), e);
                }
            }
            PromptAction::PassThrough => {
                self.context.events.notify(ConsoleEvent::Prompt {
                    handle: self.handle(),
                    prompt: prompt.to_string(),
                });
            }
        }
    }

    fn commit_output(&self, output: &str) {
        let alt_changed = {
            let mut buffer = self.output.lock();
            let changed = buffer.append(output);
            changed.then(|| buffer.alt_buffer_active())
        };

        if let Some(active) = alt_changed {
            self.info.lock().alt_buffer_active = active;
            self.save_state();
        }

        let (handle, channel, max_output_lines) = {
            let info = self.info.lock();
            (info.handle.clone(), info.channel, info.max_output_lines)
        };

        if channel.is_direct_socket() {
            self.context.channels.send_text(&handle, output);
            return;
        }

        // the client cannot show more than this anyway
        let trimmed = trim_leading_lines(output, max_output_lines);
        self.context.events.notify(ConsoleEvent::Output {
            handle,
            output: trimmed.to_string(),
        });
    }
}

impl ProcessCallbacks for ConsoleProcess {
    fn on_continue(&self, ops: &Arc<dyn ProcessOperations>) -> bool {
        if self.interrupt.load(Ordering::SeqCst) {
            return false;
        }

        if self.interrupt_child.swap(false, Ordering::SeqCst) {
            if let Err(e) = ops.pty_interrupt() {
                warn!("Failed to interrupt child: handle={}, error={}", self.handle(), e);
            }
        }

        if self.private_command_tick(ops.as_ref()) {
            return true;
        }

        {
            let mut state = self.input_state.lock();
            self.drain_input(&mut state, ops.as_ref());
        }

        if self.info.lock().channel.is_direct_socket() {
            let mut slot = self.ops.lock();
            if slot.is_none() {
                *slot = Some(Arc::downgrade(ops));
            }
        }

        let resize = self.pending_resize.lock().take();
        if let Some(dimensions) = resize {
            if let Err(e) = ops.pty_set_size(dimensions.cols, dimensions.rows) {
                warn!("Failed to resize: handle={}, error={}", self.handle(), e);
            }
            self.info.lock().dimensions = dimensions;
            self.save_state();
        }

        *self.pid.lock() = ops.pid();
        true
    }

    fn on_stdout(&self, ops: &dyn ProcessOperations, output: &str) {
        let visible = self.private_command.lock().filter_output(output);
        if let Some(visible) = visible {
            if !visible.is_empty() {
                self.process_output(ops, &visible);
            }
        }
    }

    fn on_stderr(&self, ops: &dyn ProcessOperations, output: &str) {
        self.on_stdout(ops, output);
    }

    fn on_exit(&self, exit_code: i32) {
        let handle = {
            let mut info = self.info.lock();
            info.exit_code = Some(exit_code);
            info.has_child_procs = false;
            info.handle.clone()
        };
        info!("Console process exited: handle={}, exit_code={}", handle, exit_code);

        self.save_state();
        self.context
            .events
            .notify(ConsoleEvent::Exit { handle, exit_code });

        let handler = self.exit_handler.lock().take();
        if let Some(handler) = handler {
            handler(exit_code);
        }
    }

    fn on_has_subprocs(&self, has_subprocs: bool) {
        let handle = {
            let mut info = self.info.lock();
            if has_subprocs == info.has_child_procs && self.child_procs_sent.load(Ordering::SeqCst)
            {
                return;
            }
            info.has_child_procs = has_subprocs;
            info.handle.clone()
        };

        self.context.events.notify(ConsoleEvent::Subprocs {
            handle,
            has_subprocs,
        });
        self.child_procs_sent.store(true, Ordering::SeqCst);
    }

    fn report_cwd(&self, cwd: &Path) {
        let handle = {
            let mut info = self.info.lock();
            if info.cwd.as_deref() == Some(cwd) {
                return;
            }
            info.cwd = Some(cwd.to_path_buf());
            info.handle.clone()
        };

        self.context.events.notify(ConsoleEvent::WorkingDirectory {
            handle,
            cwd: aliased_path(cwd),
        });
        self.save_state();
    }
}

/// Show the home directory as `~`.
fn aliased_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return "~".to_string();
            }
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}
