//! Core configuration types.
//!
//! [`InstanceConfig`] holds the engine-independent settings of one
//! [`ServiceInstance`](crate::instance::ServiceInstance). Engine-specific
//! settings (binary paths, argument strings) live in the engine's own config.

use super::duration::serde_duration;
use super::search_paths::SearchPaths;
use crate::engine::{PostgresConfig, PostgresEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Startup timeout: the server must pass its readiness probe within this window.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown timeout: after this the process is sent SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Granularity of the startup and shutdown wait loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How much of the lifecycle runs during construction.
///
/// Serialized as the integers `0`, `1` and `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AutoStart {
    /// Construct only; the caller drives `provision()` and `start()`.
    Manual,
    /// Start the server, assuming the data directory is already in place.
    Start,
    /// Provision the directory tree, then start.
    #[default]
    ProvisionAndStart,
}

impl AutoStart {
    pub fn provisions(self) -> bool {
        self >= AutoStart::ProvisionAndStart
    }

    pub fn starts(self) -> bool {
        self >= AutoStart::Start
    }
}

impl TryFrom<u8> for AutoStart {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(AutoStart::Manual),
            1 => Ok(AutoStart::Start),
            2 => Ok(AutoStart::ProvisionAndStart),
            other => Err(format!(
                "auto_start must be 0 (manual), 1 (start) or 2 (provision + start), got {}",
                other
            )),
        }
    }
}

impl From<AutoStart> for u8 {
    fn from(level: AutoStart) -> Self {
        match level {
            AutoStart::Manual => 0,
            AutoStart::Start => 1,
            AutoStart::ProvisionAndStart => 2,
        }
    }
}

impl fmt::Display for AutoStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Settings for a single managed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Directory holding logs, data and sockets. `None` creates a temp dir
    /// that is removed on cleanup; a supplied directory is never removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    pub auto_start: AutoStart,

    /// Listening port. Allocated on first start when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Pre-initialized data directory cloned into this instance on provision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_data_from: Option<PathBuf>,

    #[serde(with = "serde_duration")]
    pub start_timeout: Duration,

    #[serde(with = "serde_duration")]
    pub stop_timeout: Duration,

    #[serde(with = "serde_duration")]
    pub poll_interval: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            auto_start: AutoStart::default(),
            port: None,
            copy_data_from: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl InstanceConfig {
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_auto_start(mut self, auto_start: AutoStart) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_copy_data_from(mut self, source: impl Into<PathBuf>) -> Self {
        self.copy_data_from = Some(source.into());
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Root structure of `ephemeral.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instance: InstanceConfig,

    pub postgres: PostgresConfig,

    /// Extra install prefixes searched for engine binaries, tried before the
    /// built-in list. Each entry is a glob pattern.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<String>,
}

impl Config {
    /// PostgreSQL engine with the configured prefixes searched before the
    /// built-in ones.
    pub fn postgres_engine(&self) -> PostgresEngine {
        let search_paths =
            SearchPaths::postgres().prepend(SearchPaths::from_patterns(&self.search_paths));
        PostgresEngine::new(self.postgres.clone()).with_search_paths(search_paths)
    }
}
