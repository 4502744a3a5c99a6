use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use fileshell_protocol::ConsoleMode;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const HOME_ENV_VAR: &str = "FILESHELL_HOME";

const DEFAULT_TIMEOUT_MS: u64 = 6_000;
const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// How to launch the privileged shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellLauncher {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ShellLauncher {
    fn default() -> Self {
        Self {
            program: "su".to_string(),
            args: Vec::new(),
        }
    }
}

/// Settings for the console subsystem.
///
/// `default_mode` is the persisted privilege preference the registry reads
/// at first allocation; everything else tunes the shell backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub default_mode: ConsoleMode,
    pub shell: ShellLauncher,
    /// Longest the shell backend may stay silent before the operation times
    /// out, in milliseconds.
    pub timeout_ms: u64,
    /// Cap on buffered output per execution, in bytes.
    pub buffer_size: usize,
    /// Log command traffic at debug level.
    pub trace: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_mode: ConsoleMode::Restricted,
            shell: ShellLauncher::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            trace: false,
        }
    }
}

impl ConsoleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load from `path`, or from the default location
    /// (`$FILESHELL_HOME/config.toml`, falling back to
    /// `~/.fileshell/config.toml`) when none is given. A missing file yields
    /// the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV_VAR) {
        if !home.is_empty() {
            return Some(PathBuf::from(home).join(CONFIG_FILE_NAME));
        }
    }
    dirs::home_dir().map(|home| home.join(".fileshell").join(CONFIG_FILE_NAME))
}
