//! Shell discovery for interactive terminals.
//!
//! Resolves a requested [`ShellType`] to an executable path and argument
//! vector, with a last-ditch fallback to the system shell.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kinds of shell a terminal can host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ShellType {
    /// Whatever the platform considers the default
    #[default]
    Default,
    /// GNU Bash
    Bash,
    /// Z shell
    Zsh,
    /// POSIX sh
    Sh,
    /// Fish
    Fish,
    /// Windows Command Prompt
    Cmd,
    /// Windows PowerShell
    PowerShell,
    /// PowerShell Core (pwsh)
    PowerShellCore,
}

impl ShellType {
    /// Human readable shell name.
    pub fn name(&self) -> &'static str {
        match self {
            ShellType::Default => "Default",
            ShellType::Bash => "Bash",
            ShellType::Zsh => "Zsh",
            ShellType::Sh => "Sh",
            ShellType::Fish => "Fish",
            ShellType::Cmd => "Command Prompt",
            ShellType::PowerShell => "Windows PowerShell",
            ShellType::PowerShellCore => "PowerShell Core",
        }
    }

    /// Whether a transcript saved from an earlier process can be replayed
    /// into a fresh instance of this shell.
    ///
    /// Native Windows console shells repaint their whole framebuffer, so a
    /// replayed transcript ends up interleaved with the new screen.
    pub fn supports_scrollback_replay(&self) -> bool {
        !matches!(
            self,
            ShellType::Cmd | ShellType::PowerShell | ShellType::PowerShellCore
        )
    }

    /// Guess the shell type from an executable path.
    pub fn from_path(path: &Path) -> ShellType {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match stem.as_str() {
            "bash" => ShellType::Bash,
            "zsh" => ShellType::Zsh,
            "sh" | "dash" => ShellType::Sh,
            "fish" => ShellType::Fish,
            "cmd" => ShellType::Cmd,
            "powershell" => ShellType::PowerShell,
            "pwsh" => ShellType::PowerShellCore,
            _ => ShellType::Default,
        }
    }
}

impl std::fmt::Display for ShellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A resolved shell: type, executable and arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalShell {
    /// Shell kind
    pub shell_type: ShellType,
    /// Path to the executable
    pub path: PathBuf,
    /// Arguments passed on launch
    pub args: Vec<String>,
}

impl TerminalShell {
    /// Create a new shell description.
    pub fn new(shell_type: ShellType, path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            shell_type,
            path: path.into(),
            args,
        }
    }

    /// Whether the executable exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// The set of shells found on this machine.
#[derive(Debug, Clone, Default)]
pub struct AvailableShells {
    shells: Vec<TerminalShell>,
}

impl AvailableShells {
    /// Probe the well-known install locations.
    pub fn detect() -> Self {
        Self::from_candidates(Self::candidates())
    }

    /// Keep only the candidates whose executable exists.
    pub fn from_candidates(candidates: Vec<TerminalShell>) -> Self {
        let shells: Vec<TerminalShell> = candidates.into_iter().filter(|s| s.exists()).collect();
        debug!("Detected {} shell(s)", shells.len());
        Self { shells }
    }

    /// All detected shells.
    pub fn shells(&self) -> &[TerminalShell] {
        &self.shells
    }

    /// Look up a shell by type. `Default` resolves to the system shell.
    pub fn get_info(&self, shell_type: ShellType) -> Option<TerminalShell> {
        if shell_type == ShellType::Default {
            return Self::system_shell();
        }
        self.shells
            .iter()
            .find(|s| s.shell_type == shell_type)
            .cloned()
    }

    /// The platform's default shell.
    #[cfg(unix)]
    pub fn system_shell() -> Option<TerminalShell> {
        let from_env = std::env::var_os("SHELL").map(PathBuf::from);
        from_env
            .into_iter()
            .chain([PathBuf::from("/bin/bash"), PathBuf::from("/bin/sh")])
            .find(|p| p.exists())
            .map(|path| {
                let shell_type = ShellType::from_path(&path);
                TerminalShell::new(shell_type, path, Self::default_args(shell_type))
            })
    }

    /// The platform's default shell.
    #[cfg(windows)]
    pub fn system_shell() -> Option<TerminalShell> {
        let from_env = std::env::var_os("ComSpec").map(PathBuf::from);
        from_env
            .into_iter()
            .chain([PathBuf::from(r"C:\Windows\System32\cmd.exe")])
            .find(|p| p.exists())
            .map(|path| TerminalShell::new(ShellType::Cmd, path, Vec::new()))
    }

    fn default_args(shell_type: ShellType) -> Vec<String> {
        match shell_type {
            ShellType::Bash => vec!["-l".to_string()],
            ShellType::PowerShell | ShellType::PowerShellCore => vec!["-NoLogo".to_string()],
            _ => Vec::new(),
        }
    }

    #[cfg(unix)]
    fn candidates() -> Vec<TerminalShell> {
        [
            (ShellType::Bash, "/bin/bash"),
            (ShellType::Bash, "/usr/bin/bash"),
            (ShellType::Zsh, "/bin/zsh"),
            (ShellType::Zsh, "/usr/bin/zsh"),
            (ShellType::Sh, "/bin/sh"),
            (ShellType::Fish, "/usr/bin/fish"),
            (ShellType::Fish, "/usr/local/bin/fish"),
            (ShellType::PowerShellCore, "/usr/bin/pwsh"),
            (ShellType::PowerShellCore, "/usr/local/bin/pwsh"),
        ]
        .into_iter()
        .map(|(t, p)| TerminalShell::new(t, p, Self::default_args(t)))
        .collect()
    }

    #[cfg(windows)]
    fn candidates() -> Vec<TerminalShell> {
        [
            (ShellType::Cmd, r"C:\Windows\System32\cmd.exe"),
            (
                ShellType::PowerShell,
                r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe",
            ),
            (ShellType::PowerShellCore, r"C:\Program Files\PowerShell\7\pwsh.exe"),
            (ShellType::Bash, r"C:\Program Files\Git\bin\bash.exe"),
        ]
        .into_iter()
        .map(|(t, p)| TerminalShell::new(t, p, Self::default_args(t)))
        .collect()
    }
}
