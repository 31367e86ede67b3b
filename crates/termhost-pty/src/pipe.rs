//! Children attached to plain pipes, for processes that never interact.

use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::Sender;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use termhost_core::{Error, Result};

use crate::child::{spawn_reader, ChildProcess, Chunk};
use crate::ops::{Launch, ProcessOperations, ProcessOptions};
use crate::pty::platform_shell;

/// A child process connected through pipes.
#[derive(Debug)]
pub struct PipeChild {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    pid: u32,
}

impl PipeChild {
    /// Spawn `launch` with piped standard streams.
    pub(crate) fn spawn(launch: &Launch, options: &ProcessOptions, tx: Sender<Chunk>) -> Result<Self> {
        info!(
            "Spawning piped process: launch='{}', cwd={:?}",
            launch.describe(),
            options.working_dir
        );

        let mut cmd = match launch {
            Launch::Command(command) => {
                let (shell, flag) = platform_shell();
                let mut cmd = Command::new(shell);
                cmd.arg(flag).arg(command);
                cmd
            }
            Launch::Program { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };

        cmd.envs(options.environment.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn '{}': {}", launch.describe(), e);
            Error::LaunchFailed(format!("Failed to spawn command: {e}"))
        })?;

        let pid = child.id();
        let stdin = child.stdin.take();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(format!("termhost-stdout-{pid}"), stdout, tx.clone(), Chunk::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            if options.redirect_stderr_to_stdout {
                spawn_reader(format!("termhost-stderr-{pid}"), stderr, tx, Chunk::Stdout);
            } else {
                spawn_reader(format!("termhost-stderr-{pid}"), stderr, tx, Chunk::Stderr);
            }
        }

        info!("Piped process spawned: pid={}", pid);

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pid,
        })
    }
}

impl ProcessOperations for PipeChild {
    fn write_to_stdin(&self, text: &str, _is_binary: bool) -> Result<()> {
        debug!("Writing {} bytes to stdin: pid={}", text.len(), self.pid);
        let mut stdin = self.stdin.lock();
        let stdin = stdin
            .as_mut()
            .ok_or_else(|| Error::PtyError("stdin is closed".to_string()))?;
        stdin.write_all(text.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    #[cfg(unix)]
    fn pty_interrupt(&self) -> Result<()> {
        debug!("Sending SIGINT: pid={}", self.pid);
        let pid = libc::pid_t::try_from(self.pid)
            .map_err(|_| Error::PtyError(format!("pid out of range: {}", self.pid)))?;
        // SAFETY: plain signal delivery to a pid we spawned
        let rc = unsafe { libc::kill(pid, libc::SIGINT) };
        if rc == -1 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn pty_interrupt(&self) -> Result<()> {
        Err(Error::PtyError(
            "interrupt is not supported for piped processes on this platform".to_string(),
        ))
    }

    fn pty_set_size(&self, _cols: u16, _rows: u16) -> Result<()> {
        // No terminal to resize
        Ok(())
    }

    fn terminate(&self) -> Result<()> {
        info!("Killing piped process: pid={}", self.pid);
        self.child.lock().kill().map_err(Error::Io)
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }
}

impl ChildProcess for PipeChild {
    fn try_wait(&self) -> Result<Option<i32>> {
        let status = self.child.lock().try_wait()?;
        Ok(status.map(|s| s.code().unwrap_or(-1)))
    }
}
