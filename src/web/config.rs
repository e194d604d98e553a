//! Configuration types and constants for the atelier-web server.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::messaging::DEFAULT_THREAD_LIMIT;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const CONFIG_FILE: &str = "config.toml";
pub const DATABASE_FILE: &str = "atelier.db";

/// Web server for the atelier social layer.
///
/// Serves a REST API and WebSocket over the realtime store.
///
/// Settings come from CLI arguments, environment variables and an optional
/// `config.toml` in the data directory, in that order of precedence.
#[derive(Parser, Debug, Default)]
#[command(name = "atelier-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: ATELIER_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database and config file [env: ATELIER_HOME] [default: ~/.atelier]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Handle of the owner account [env: ATELIER_OWNER]
    #[arg(long)]
    pub owner_handle: Option<String>,

    /// Handle of the restricted identity [env: ATELIER_RESTRICTED]
    #[arg(long)]
    pub restricted_handle: Option<String>,

    /// Admin handle, may be repeated [env: ATELIER_ADMINS, comma-separated]
    #[arg(long = "admin")]
    pub admins: Vec<String>,

    /// Messages kept in view per thread [env: ATELIER_THREAD_LIMIT] [default: 100]
    #[arg(long)]
    pub thread_limit: Option<usize>,

    /// Keep all data in memory instead of SQLite
    #[arg(long)]
    pub in_memory: bool,
}

/// Contents of `{data_dir}/config.toml`.  Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub owner_handle: Option<String>,
    pub restricted_handle: Option<String>,
    pub admins: Vec<String>,
    pub thread_limit: Option<usize>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {e}", path.display()),
            ConfigError::Parse(path, e) => write!(f, "invalid {}: {e}", path.display()),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, e) => Some(e),
            ConfigError::Parse(_, e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl FileConfig {
    /// Load the config file, or defaults if there is none.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(path.to_path_buf(), e)),
        }
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub owner_handle: String,
    pub restricted_handle: String,
    pub admins: Vec<String>,
    pub thread_limit: usize,
    pub in_memory: bool,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Merge CLI > environment > config file > defaults.  `env` looks up an
    /// environment variable.
    pub fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = cli
            .data_dir
            .or_else(|| env("ATELIER_HOME").map(PathBuf::from))
            .unwrap_or_else(|| {
                env("HOME")
                    .map(|h| PathBuf::from(h).join(".atelier"))
                    .unwrap_or_else(|| PathBuf::from(".atelier"))
            });
        let file = FileConfig::load(&data_dir.join(CONFIG_FILE))?;

        let bind_addr = cli
            .bind
            .or_else(|| env("ATELIER_BIND"))
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let owner_handle = cli
            .owner_handle
            .or_else(|| env("ATELIER_OWNER"))
            .or(file.owner_handle)
            .unwrap_or_default();

        let restricted_handle = cli
            .restricted_handle
            .or_else(|| env("ATELIER_RESTRICTED"))
            .or(file.restricted_handle)
            .unwrap_or_default();

        let admins = if !cli.admins.is_empty() {
            cli.admins
        } else if let Some(list) = env("ATELIER_ADMINS") {
            list.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            file.admins
        };

        let thread_limit = match cli.thread_limit {
            Some(n) => n,
            None => match env("ATELIER_THREAD_LIMIT") {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    ConfigError::Invalid(format!("ATELIER_THREAD_LIMIT '{raw}' is not a number"))
                })?,
                None => file.thread_limit.unwrap_or(DEFAULT_THREAD_LIMIT),
            },
        };
        if thread_limit == 0 {
            return Err(ConfigError::Invalid(
                "thread limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            data_dir,
            owner_handle,
            restricted_handle,
            admins,
            thread_limit,
            in_memory: cli.in_memory,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "bind = \"0.0.0.0:1\"\nowner_handle = \"file_owner\"\nrestricted_handle = \"file_hidden\"\nthread_limit = 7\n",
        )
        .unwrap();
        let cli = Cli {
            data_dir: Some(dir.path().to_path_buf()),
            owner_handle: Some("cli_owner".to_string()),
            ..Default::default()
        };
        let env = env_of(&[("ATELIER_OWNER", "env_owner"), ("ATELIER_BIND", "0.0.0.0:2")]);
        let config = Config::resolve(cli, env).unwrap();
        assert_eq!(config.owner_handle, "cli_owner");
        assert_eq!(config.bind_addr, "0.0.0.0:2");
        assert_eq!(config.restricted_handle, "file_hidden");
        assert_eq!(config.thread_limit, 7);
        assert_eq!(config.db_path(), dir.path().join("atelier.db"));
    }

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = Config::resolve(cli, env_of(&[("ATELIER_ADMINS", "a, b,,c")])).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.thread_limit, DEFAULT_THREAD_LIMIT);
        assert_eq!(config.admins, ["a", "b", "c"]);
    }

    #[test]
    fn bad_values_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "colour = true\n").unwrap();
        let cli = Cli {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(cli, env_of(&[])),
            Err(ConfigError::Parse(..))
        ));

        let empty = tempfile::tempdir().unwrap();
        let cli = Cli {
            data_dir: Some(empty.path().to_path_buf()),
            ..Default::default()
        };
        assert!(Config::resolve(cli, env_of(&[("ATELIER_THREAD_LIMIT", "lots")])).is_err());
    }
}
