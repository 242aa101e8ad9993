//! Configuration module for wordpage.
//!
//! Settings come from a flat key-value config file (JSON, or TOML when the
//! file name ends in `.toml`) and from command-line flags. Flags take
//! precedence over config file values.
//!
//! Keys:
//! - server: `server_ip`, `server_port`, `filename`
//! - client: `server_ip`, `server_port`, `k` (page size), `p` (initial offset)
//! - both: `log_level` (optional)

use clap::{Args, Parser, Subcommand};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "wordpage")]
#[command(author = "wordpage authors")]
#[command(version = "0.1.0")]
#[command(about = "Paginated word streaming over a line protocol", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub mode: Mode,
}

/// Which end of the protocol to run
#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Serve pages of a word file, one connection at a time
    Server(ServerArgs),
    /// Fetch every page from a server and print word frequencies
    Client(ClientArgs),
}

/// Flags shared by both modes
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Path to the config file (defaults to ./config.json when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server IP address
    #[arg(long)]
    pub server_ip: Option<String>,

    /// Server TCP port
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Word file to serve
    #[arg(short, long)]
    pub filename: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Words requested per page
    #[arg(short = 'k', long = "step")]
    pub step: Option<usize>,

    /// Offset of the first page
    #[arg(short = 'p', long = "offset")]
    pub offset: Option<usize>,

    /// Print only the elapsed time, not the frequency table
    #[arg(short, long)]
    pub quiet: bool,
}

/// A single value in the config file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Arrays and tables, rejected after parsing.
    Nested(IgnoredAny),
}

/// Flat key-value settings, as read from a config file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigMap {
    entries: HashMap<String, String>,
}

impl ConfigMap {
    /// Parse a flat JSON object. Scalar values are kept as strings.
    pub fn from_json_str(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let entries: HashMap<String, Option<FileValue>> = serde_json::from_str(contents)
            .map_err(|e| ConfigError::JsonParse(path.to_path_buf(), e))?;
        Self::from_entries(path, entries)
    }

    /// Parse a flat TOML table. Scalar values are kept as strings.
    pub fn from_toml_str(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let entries: HashMap<String, Option<FileValue>> =
            toml::from_str(contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))?;
        Self::from_entries(path, entries)
    }

    fn from_entries(
        path: &Path,
        entries: HashMap<String, Option<FileValue>>,
    ) -> Result<Self, ConfigError> {
        let mut map = Self::default();
        for (key, value) in entries {
            let value = match value {
                None => continue,
                Some(FileValue::Flag(b)) => b.to_string(),
                Some(FileValue::Integer(i)) => i.to_string(),
                Some(FileValue::Float(f)) => f.to_string(),
                Some(FileValue::Text(s)) => s,
                Some(FileValue::Nested(_)) => {
                    return Err(ConfigError::NotScalar(path.to_path_buf(), key));
                }
            };
            map.set(&key, value);
        }
        Ok(map)
    }

    /// Read a config file, picking the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(path, &contents)
        } else {
            Self::from_json_str(path, &contents)
        }
    }

    /// Load the explicitly named file, or the default file when it exists.
    fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    /// Overwrite `key` when a flag supplied a value.
    fn merge<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(key, value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Fetch a key that must be present and non-empty.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::MissingKey(key.to_string())),
        }
    }

    /// Fetch and parse a required key.
    pub fn require_parsed<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.require(key)?;
        value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetch an optional boolean key, absent meaning `false`.
    pub fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(false),
            Some(_) => self.require_parsed(key),
        }
    }

    fn log_level(&self) -> String {
        self.get("log_level")
            .filter(|level| !level.is_empty())
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .to_string()
    }

    fn address(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.require_parsed("server_ip")?;
        let port: u16 = self.require_parsed("server_port")?;
        Ok(SocketAddr::new(ip, port))
    }
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub filename: PathBuf,
    pub log_level: String,
}

impl ServerConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        Ok(Self {
            listen: map.address()?,
            filename: PathBuf::from(map.require("filename")?),
            log_level: map.log_level(),
        })
    }
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub step: usize,
    pub initial_offset: usize,
    /// Report only the elapsed time
    pub quiet: bool,
    pub log_level: String,
}

impl ClientConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let step: usize = map.require_parsed("k")?;
        if step == 0 {
            return Err(ConfigError::InvalidValue {
                key: "k".to_string(),
                value: "0".to_string(),
                reason: "page size must be positive".to_string(),
            });
        }

        Ok(Self {
            server: map.address()?,
            step,
            initial_offset: map.require_parsed("p")?,
            quiet: map.flag("quiet")?,
            log_level: map.log_level(),
        })
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub enum Config {
    Server(ServerConfig),
    Client(ClientConfig),
}

impl Config {
    /// Load configuration from CLI args and the config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve parsed CLI args against the config file they point to.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        match cli.mode {
            Mode::Server(args) => {
                let mut map = merged_map(args.common)?;
                map.merge("filename", args.filename.map(|p| p.display().to_string()));
                ServerConfig::from_map(&map).map(Config::Server)
            }
            Mode::Client(args) => {
                let mut map = merged_map(args.common)?;
                map.merge("k", args.step);
                map.merge("p", args.offset);
                if args.quiet {
                    map.set("quiet", "true");
                }
                ClientConfig::from_map(&map).map(Config::Client)
            }
        }
    }

    pub fn log_level(&self) -> &str {
        match self {
            Config::Server(config) => &config.log_level,
            Config::Client(config) => &config.log_level,
        }
    }
}

fn merged_map(common: CommonArgs) -> Result<ConfigMap, ConfigError> {
    let mut map = ConfigMap::load(common.config.as_deref())?;
    map.merge("server_ip", common.server_ip);
    map.merge("server_port", common.server_port);
    map.merge("log_level", common.log_level);
    Ok(map)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    JsonParse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Config key '{}' in '{}' must be a string or number", .1, .0.display())]
    NotScalar(PathBuf, String),

    #[error("Missing required config key '{0}'")]
    MissingKey(String),

    #[error("Invalid value {value:?} for config key '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
