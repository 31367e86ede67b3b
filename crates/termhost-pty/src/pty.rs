//! Children attached to a pseudo-terminal, via portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::Write;
use std::sync::mpsc::Sender;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use termhost_core::{Dimensions, Error, Result};

use crate::child::{spawn_reader, ChildProcess, Chunk};
use crate::ops::{Launch, ProcessOperations, ProcessOptions};

/// Ctrl+C as the line discipline sees it.
const INTERRUPT: &[u8] = b"\x03";

/// A child process running on a pseudo-terminal.
pub struct PtyChild {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    writer: Mutex<Box<dyn Write + Send>>,
    pid: Option<u32>,
}

impl std::fmt::Debug for PtyChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyChild")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl PtyChild {
    /// Spawn `launch` on a new pseudo-terminal of the given size.
    ///
    /// Output (standard output and standard error share the terminal) is sent
    /// to `tx` from a reader thread.
    pub(crate) fn spawn(
        launch: &Launch,
        options: &ProcessOptions,
        dimensions: Dimensions,
        tx: Sender<Chunk>,
    ) -> Result<Self> {
        info!(
            "Spawning PTY: launch='{}', dimensions={}, cwd={:?}",
            launch.describe(),
            dimensions,
            options.working_dir
        );

        let pty_system = native_pty_system();

        let pair = pty_system.openpty(pty_size(dimensions)).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::PtyError(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = command_builder(launch);
        for (key, value) in &options.environment {
            cmd.env(key, value);
        }
        if let Some(dir) = &options.working_dir {
            debug!("Setting working directory to: {}", dir.display());
            cmd.cwd(dir);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn '{}': {}", launch.describe(), e);
            Error::LaunchFailed(format!("Failed to spawn command: {e}"))
        })?;

        // Closing our slave end lets the reader see EOF once the child is gone
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| {
            error!("Failed to take PTY writer: {}", e);
            Error::PtyError(format!("Failed to take writer: {e}"))
        })?;

        let reader = pair.master.try_clone_reader().map_err(|e| {
            error!("Failed to clone PTY reader: {}", e);
            Error::PtyError(format!("Failed to clone reader: {e}"))
        })?;

        let pid = child.process_id();
        spawn_reader(
            format!("termhost-pty-{}", pid.unwrap_or_default()),
            reader,
            tx,
            Chunk::Stdout,
        );

        info!("PTY spawned: pid={:?}", pid);

        Ok(Self {
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            writer: Mutex::new(writer),
            pid,
        })
    }

    fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}

impl ProcessOperations for PtyChild {
    fn write_to_stdin(&self, text: &str, _is_binary: bool) -> Result<()> {
        debug!("Writing {} bytes to PTY: pid={:?}", text.len(), self.pid);
        self.write_bytes(text.as_bytes())
    }

    fn pty_interrupt(&self) -> Result<()> {
        debug!("Interrupting PTY foreground job: pid={:?}", self.pid);
        self.write_bytes(INTERRUPT)
    }

    fn pty_set_size(&self, cols: u16, rows: u16) -> Result<()> {
        let dimensions = Dimensions::new(rows, cols);
        if !dimensions.is_valid() {
            return Err(Error::InvalidDimensions { rows, cols });
        }

        info!("Resizing PTY to {}: pid={:?}", dimensions, self.pid);
        self.master
            .lock()
            .resize(pty_size(dimensions))
            .map_err(|e| Error::PtyError(format!("Resize failed: {e}")))
    }

    fn terminate(&self) -> Result<()> {
        info!("Killing PTY process: pid={:?}", self.pid);
        self.child
            .lock()
            .kill()
            .map_err(|e| Error::PtyError(format!("Kill failed: {e}")))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl ChildProcess for PtyChild {
    fn try_wait(&self) -> Result<Option<i32>> {
        let status = self
            .child
            .lock()
            .try_wait()
            .map_err(|e| Error::PtyError(format!("Wait failed: {e}")))?;
        Ok(status.map(|s| s.exit_code() as i32))
    }
}

fn pty_size(dimensions: Dimensions) -> PtySize {
    PtySize {
        rows: dimensions.rows,
        cols: dimensions.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn command_builder(launch: &Launch) -> CommandBuilder {
    match launch {
        Launch::Command(command) => {
            let (shell, flag) = platform_shell();
            let mut cmd = CommandBuilder::new(shell);
            cmd.arg(flag);
            cmd.arg(command);
            cmd
        }
        Launch::Program { program, args } => {
            let mut cmd = CommandBuilder::new(program);
            cmd.args(args);
            cmd
        }
    }
}

/// Shell and flag used to run a command line.
pub(crate) fn platform_shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd.exe", "/C")
    } else {
        ("/bin/sh", "-c")
    }
}
