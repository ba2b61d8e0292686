//! Configuration module for aesdsocket.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the socket server
#[derive(Parser, Debug, Default)]
#[command(name = "aesdsocket")]
#[command(author = "aesdsocket authors")]
#[command(version = "0.1.0")]
#[command(about = "Appends received bytes to a shared log and echoes the log back", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Fork into the background once the listening socket is bound
    #[arg(short, long)]
    pub daemon: bool,

    /// Host to bind to (defaults to every local address family)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path of the shared log file
    #[arg(short = 'f', long)]
    pub data_file: Option<PathBuf>,

    /// Remove any existing log file before accepting connections
    #[arg(long)]
    pub fresh_start: bool,

    /// Receive buffer capacity in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Per-read/per-write timeout in seconds (unbounded when unset)
    #[arg(long)]
    pub io_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Where log records go
    #[arg(long, value_enum)]
    pub log_target: Option<LogTarget>,
}

/// Diagnostic sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// System logging facility
    Syslog,
    /// Standard error
    Stderr,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: Option<String>,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Run in the background
    #[serde(default)]
    pub daemon: bool,
    /// Delete the log file at startup
    #[serde(default)]
    pub fresh_start: bool,
    /// Receive buffer capacity
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Optional I/O timeout in seconds
    pub io_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            daemon: false,
            fresh_start: false,
            buffer_size: default_buffer_size(),
            io_timeout_secs: None,
        }
    }
}

/// Log store configuration
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Path of the shared log file
    #[serde(default = "default_data_file")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_data_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log sink
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            target: default_log_target(),
        }
    }
}

fn default_port() -> u16 {
    9000
}

fn default_buffer_size() -> usize {
    1024
}

fn default_data_file() -> PathBuf {
    PathBuf::from("/var/tmp/aesdsocketdata")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_target() -> LogTarget {
    LogTarget::Syslog
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Option<String>,
    pub port: u16,
    pub daemon: bool,
    pub fresh_start: bool,
    pub buffer_size: usize,
    pub io_timeout_secs: Option<u64>,
    pub data_file: PathBuf,
    pub log_level: String,
    pub log_target: LogTarget,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI arguments over the TOML file they point to, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            host: cli.host.or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            daemon: cli.daemon || toml_config.server.daemon,
            fresh_start: cli.fresh_start || toml_config.server.fresh_start,
            buffer_size: cli.buffer_size.unwrap_or(toml_config.server.buffer_size),
            io_timeout_secs: cli.io_timeout.or(toml_config.server.io_timeout_secs),
            data_file: cli.data_file.unwrap_or(toml_config.store.path),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            log_target: cli.log_target.unwrap_or(toml_config.logging.target),
        };

        if config.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be greater than zero"));
        }

        if config.io_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("io_timeout_secs must be greater than zero"));
        }

        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
