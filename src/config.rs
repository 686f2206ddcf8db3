//! Configuration management
//!
//! Reads settings from `$HOME/.config/pipesh/config.toml` unless another file
//! is named on the command line. Every key is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Shell configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Print parsed pipelines and stage decisions to stderr.
    #[serde(default)]
    pub trace: bool,

    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// `~/` is expanded to the home directory.
    #[serde(default = "default_history_file")]
    pub history_file: String,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Printed when Ctrl-C abandons the line being edited.
    #[serde(default = "default_interrupt_prompt")]
    pub interrupt_prompt: String,

    /// Printed when the input ends.
    #[serde(default = "default_exit_message")]
    pub exit_message: String,

    /// Lines between descriptor audits; 0 disables them.
    #[serde(default)]
    pub check_interval: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            history_file: default_history_file(),
            history_limit: default_history_limit(),
            interrupt_prompt: default_interrupt_prompt(),
            exit_message: default_exit_message(),
            check_interval: 0,
        }
    }
}

fn default_history_file() -> String {
    "~/.pipesh_history".to_string()
}

fn default_history_limit() -> usize {
    1000
}

fn default_interrupt_prompt() -> String {
    "^C".to_string()
}

fn default_exit_message() -> String {
    "exit".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Colour name or a raw escape sequence.
    #[serde(default = "default_path_colour")]
    pub path_colour: String,

    #[serde(default)]
    pub path_bold: bool,

    #[serde(default = "default_symbol")]
    pub symbol: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            path_colour: default_path_colour(),
            path_bold: false,
            symbol: default_symbol(),
        }
    }
}

fn default_theme() -> String {
    "none".to_string()
}

fn default_path_colour() -> String {
    "green".to_string()
}

fn default_symbol() -> String {
    "$".to_string()
}

impl Config {
    /// Load config from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Option<String> {
        toml::to_string_pretty(self).ok()
    }

    /// Load the file at `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$HOME/.config/pipesh/config.toml`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".config").join("pipesh").join("config.toml"))
    }

    /// History file with a leading `~/` resolved against `HOME`.
    pub fn history_path(&self) -> PathBuf {
        expand_home(&self.terminal.history_file)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.terminal.history_limit, 1000);
        assert_eq!(config.terminal.interrupt_prompt, "^C");
        assert_eq!(config.prompt.symbol, "$");
        assert!(!config.trace);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            trace = true
            [terminal]
            check_interval = 5
            [prompt]
            theme = "monokai"
            "#,
        )
        .unwrap();
        assert!(config.trace);
        assert_eq!(config.terminal.check_interval, 5);
        assert_eq!(config.terminal.exit_message, "exit");
        assert_eq!(config.prompt.theme, "monokai");
        assert_eq!(config.prompt.path_colour, "green");
    }

    #[test]
    fn serialized_config_reads_back() {
        let mut config = Config::default();
        config.prompt.path_bold = true;
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terminal\nhistory_limit = ").unwrap();
        assert_matches!(Config::load(&path), Err(ConfigError::Parse { .. }));
    }

    #[test]
    fn wrong_type_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terminal]\nhistory_limit = \"many\"\n").unwrap();
        assert_matches!(Config::load(&path), Err(ConfigError::Parse { .. }));
    }

    #[test]
    fn absolute_history_path_is_kept() {
        let mut config = Config::default();
        config.terminal.history_file = "/tmp/history".to_string();
        assert_eq!(config.history_path(), PathBuf::from("/tmp/history"));
    }
}
