//! Seams between a console process and the child it drives.
//!
//! A [`ProcessSupervisor`] spawns children and drives a continuation tick per
//! child. The tick calls back into [`ProcessCallbacks`], handing out the
//! [`ProcessOperations`] that act on the running child.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use termhost_core::{Dimensions, Result};

/// Operations on a running child process.
///
/// Implementations are only reachable while the child is alive. Callers that
/// need to act on the child from another thread keep a `Weak` reference and
/// upgrade it before use.
pub trait ProcessOperations: Send + Sync {
    /// Write text to the child's standard input.
    ///
    /// `is_binary` skips any line ending translation.
    fn write_to_stdin(&self, text: &str, is_binary: bool) -> Result<()>;

    /// Interrupt the foreground job (Ctrl+C).
    fn pty_interrupt(&self) -> Result<()>;

    /// Resize the pseudo-terminal.
    fn pty_set_size(&self, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the child.
    fn terminate(&self) -> Result<()>;

    /// Operating system process id, if known.
    fn pid(&self) -> Option<u32>;
}

/// Callbacks invoked from the supervising thread of a child process.
pub trait ProcessCallbacks: Send + Sync {
    /// Continuation tick. Returning `false` terminates the child.
    fn on_continue(&self, ops: &Arc<dyn ProcessOperations>) -> bool;

    /// Decoded output from standard output (or the pseudo-terminal).
    fn on_stdout(&self, ops: &dyn ProcessOperations, output: &str);

    /// Decoded output from standard error.
    fn on_stderr(&self, ops: &dyn ProcessOperations, output: &str);

    /// The child exited with the given code.
    fn on_exit(&self, exit_code: i32);

    /// Periodic report on whether the child has subprocesses of its own.
    fn on_has_subprocs(&self, _has_subprocs: bool) {}

    /// Periodic report of the child's working directory.
    fn report_cwd(&self, _cwd: &Path) {}
}

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// A command line run through the platform shell.
    Command(String),
    /// A program with an argument vector.
    Program {
        /// Program path
        program: PathBuf,
        /// Arguments
        args: Vec<String>,
    },
}

impl Launch {
    /// Short description used in log messages.
    pub fn describe(&self) -> String {
        match self {
            Launch::Command(command) => command.clone(),
            Launch::Program { program, args } if args.is_empty() => {
                program.display().to_string()
            }
            Launch::Program { program, args } => {
                format!("{} {}", program.display(), args.join(" "))
            }
        }
    }
}

/// Options for spawning a child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Environment additions on top of the inherited environment
    pub environment: Vec<(String, String)>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Allocate a pseudo-terminal of this size (pipes when `None`)
    pub pseudoterminal: Option<Dimensions>,
    /// The child performs full terminal emulation itself
    pub smart_terminal: bool,
    /// Merge standard error into standard output (pipe mode)
    pub redirect_stderr_to_stdout: bool,
    /// Periodically report whether the child has subprocesses
    pub report_has_subprocs: bool,
    /// Periodically report the child's working directory
    pub track_cwd: bool,
}

impl ProcessOptions {
    /// Set an environment variable, replacing an earlier value for the same key.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.environment.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.environment.push((key, value)),
        }
    }

    /// Look up an environment addition.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Spawns child processes and drives their continuation ticks.
pub trait ProcessSupervisor: Send + Sync {
    /// Spawn a child. Callbacks run on a supervising thread until the child exits.
    fn spawn(
        &self,
        launch: Launch,
        options: ProcessOptions,
        callbacks: Arc<dyn ProcessCallbacks>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_env_replaces() {
        let mut options = ProcessOptions::default();
        options.set_env("TERM", "dumb");
        options.set_env("TERM", "xterm-256color");
        options.set_env("HOME", "/home/user");

        assert_eq!(options.environment.len(), 2);
        assert_eq!(options.env("TERM"), Some("xterm-256color"));
        assert_eq!(options.env("MISSING"), None);
    }

    #[test]
    fn test_launch_describe() {
        let command = Launch::Command("ls -la".to_string());
        assert_eq!(command.describe(), "ls -la");

        let program = Launch::Program {
            program: PathBuf::from("/bin/bash"),
            args: vec!["-l".to_string()],
        };
        assert_eq!(program.describe(), "/bin/bash -l");
    }
}
