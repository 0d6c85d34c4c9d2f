//! Daemon configuration.
//!
//! Configuration is read from an optional TOML file and then overridden by
//! environment variables:
//!
//! - `CMDCHAN_CONFIG` - path of the TOML file (when `--config` is not given)
//! - `CMDCHAN_PORT` - listen port
//!
//! Every field has a default, so a missing file is not an error.
//!
//! ```toml
//! listen_addr = "0.0.0.0"
//! port = 7070
//! broadcast_interval_secs = 10
//!
//! [intervals]
//! default = 60
//!
//! [intervals.clients]
//! "dev-42" = 15
//! ```

use std::collections::BTreeMap;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cmdchan_core::{StaticIntervals, DEFAULT_INTERVAL_SECS};
use cmdchan_protocol::DEFAULT_MAX_LINE_LENGTH;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CMDCHAN_CONFIG";

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "CMDCHAN_PORT";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 7070;

/// Default time between broadcast sweeps, in seconds.
pub const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 10;

/// Default maximum number of simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Default write timeout, in seconds.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Upper bound for the broadcast period and the write timeout (one day).
pub const MAX_PERIOD_SECS: u64 = 86_400;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Polling interval table handed to the built-in interval source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    /// Interval for clients without an entry, in seconds
    pub default: u32,

    /// Per-client intervals, keyed by client identity
    pub clients: BTreeMap<String, u32>,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_INTERVAL_SECS,
            clients: BTreeMap::new(),
        }
    }
}

/// Command channel daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Address to bind the listener to
    pub listen_addr: IpAddr,

    /// TCP port to listen on
    pub port: u16,

    /// Seconds between broadcast sweeps
    pub broadcast_interval_secs: u64,

    /// Longest accepted client line, in bytes
    pub max_line_length: usize,

    /// Connections beyond this are refused at accept time
    pub max_connections: usize,

    /// Seconds a single send may block before the client is dropped
    pub write_timeout_secs: u64,

    /// Built-in interval table
    pub intervals: IntervalsConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            broadcast_interval_secs: DEFAULT_BROADCAST_INTERVAL_SECS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            intervals: IntervalsConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Loads configuration from `path` (or `CMDCHAN_CONFIG`), then applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Applies `CMDCHAN_PORT` if set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(PORT_ENV) {
            self.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: PORT_ENV,
                value,
            })?;
        }
        Ok(())
    }

    /// Rejects values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.broadcast_interval_secs == 0 || self.broadcast_interval_secs > MAX_PERIOD_SECS {
            return Err(ConfigError::Invalid(format!(
                "broadcast_interval_secs must be between 1 and {MAX_PERIOD_SECS}"
            )));
        }
        if self.write_timeout_secs == 0 || self.write_timeout_secs > MAX_PERIOD_SECS {
            return Err(ConfigError::Invalid(format!(
                "write_timeout_secs must be between 1 and {MAX_PERIOD_SECS}"
            )));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be non-zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Builds the interval table from the `[intervals]` section.
    pub fn static_intervals(&self) -> StaticIntervals {
        self.intervals
            .clients
            .iter()
            .fold(StaticIntervals::new(self.intervals.default), |table, (id, secs)| {
                table.with_client(id.as_str(), *secs)
            })
    }
}
