//! Configuration types for termhost.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::console::DEFAULT_MAX_OUTPUT_LINES;
use crate::{Error, ShellType};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Terminal settings
    pub terminal: TerminalSettings,
    /// Channel settings
    pub channel: ChannelSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.max_processes == 0 {
            return Err(Error::Config("server.max_processes must be > 0".into()));
        }

        if self.terminal.default_rows == 0 || self.terminal.default_cols == 0 {
            return Err(Error::Config("terminal dimensions must be > 0".into()));
        }

        if self.terminal.max_output_lines == 0 {
            return Err(Error::Config("terminal.max_output_lines must be > 0".into()));
        }

        if self.terminal.buffer_limit < 1024 {
            return Err(Error::Config(
                "terminal.buffer_limit must be at least 1024 bytes".into(),
            ));
        }

        if self.channel.bind_address.trim().is_empty() {
            return Err(Error::Config("channel.bind_address cannot be empty".into()));
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory for persisted console state (none = no persistence)
    pub state_dir: Option<PathBuf>,
    /// Maximum number of console processes
    pub max_processes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            state_dir: None,
            max_processes: 32,
        }
    }
}

/// Terminal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Default terminal rows
    pub default_rows: u16,
    /// Default terminal columns
    pub default_cols: u16,
    /// Shell used when the client does not ask for one
    pub default_shell: ShellType,
    /// TERM value for full pty emulation
    pub smart_term: String,
    /// TERM value for line-oriented processes
    pub dumb_term: String,
    /// External edit command routed to GIT_EDITOR/SVN_EDITOR
    pub edit_command: Option<String>,
    /// Capture the shell environment with private commands
    pub track_env: bool,
    /// Line cap for client-visible output events
    pub max_output_lines: usize,
    /// Transcript size cap in bytes (oldest output is evicted)
    pub buffer_limit: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            default_rows: 24,
            default_cols: 80,
            default_shell: ShellType::Default,
            smart_term: "xterm-256color".to_string(),
            dumb_term: "dumb".to_string(),
            edit_command: None,
            track_env: false,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
            buffer_limit: 256 * 1024,
        }
    }
}

/// Channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Prefer the direct socket channel when it can be started
    pub direct_socket: bool,
    /// Address the socket server binds to
    pub bind_address: String,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            direct_socket: true,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.max_processes, 32);
        assert_eq!(config.terminal.default_rows, 24);
        assert_eq!(config.terminal.default_cols, 80);
        assert_eq!(config.terminal.smart_term, "xterm-256color");
        assert_eq!(config.terminal.dumb_term, "dumb");
        assert!(config.channel.direct_socket);
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_processes() {
        let mut config = ServerConfig::default();
        config.server.max_processes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = ServerConfig::default();
        config.terminal.default_rows = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_buffer_limit() {
        let mut config = ServerConfig::default();
        config.terminal.buffer_limit = 10;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  log_level: debug
  state_dir: /var/lib/termhost
  max_processes: 5

terminal:
  default_rows: 30
  default_cols: 120
  default_shell: zsh
  edit_command: "termhost-edit"
  track_env: true
  max_output_lines: 500

channel:
  direct_socket: false
  bind_address: 0.0.0.0
"#;

        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(
            config.server.state_dir.as_deref(),
            Some(Path::new("/var/lib/termhost"))
        );
        assert_eq!(config.server.max_processes, 5);
        assert_eq!(config.terminal.default_rows, 30);
        assert_eq!(config.terminal.default_cols, 120);
        assert_eq!(config.terminal.default_shell, ShellType::Zsh);
        assert_eq!(config.terminal.edit_command.as_deref(), Some("termhost-edit"));
        assert!(config.terminal.track_env);
        assert_eq!(config.terminal.max_output_lines, 500);
        assert_eq!(config.terminal.smart_term, "xterm-256color");
        assert!(!config.channel.direct_socket);
        assert_eq!(config.channel.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ServerConfig::from_yaml("terminal: [not, a, map]");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termhost.yaml");
        std::fs::write(&path, "terminal:\n  default_cols: 132\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.terminal.default_cols, 132);
        assert_eq!(config.terminal.default_rows, 24);
    }
}
