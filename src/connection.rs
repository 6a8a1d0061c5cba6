//! Connection descriptor handed to probes, hooks and callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Where and as whom to connect to a running instance.
///
/// Serializes to the `{host, port, user, database}` mapping that SQL drivers
/// accept as keyword arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

impl ConnectionParams {
    pub fn new(port: u16, user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            user: user.into(),
            database: database.into(),
        }
    }

    /// Apply per-call overrides on top of the instance defaults.
    pub fn with_overrides(mut self, overrides: &ConnectionOverrides) -> Self {
        if let Some(ref host) = overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(ref user) = overrides.user {
            self.user = user.clone();
        }
        if let Some(ref database) = overrides.database {
            self.database = database.clone();
        }
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// `scheme://user@host:port/database`
    pub fn url(&self, scheme: &str) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            scheme, self.user, self.host, self.port, self.database
        )
    }

    /// Key/value form; `dbname` is included as an alias of `database`.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("user", self.user.clone()),
            ("database", self.database.clone()),
            ("dbname", self.database.clone()),
        ])
    }
}

impl fmt::Display for ConnectionParams {
    /// libpq keyword/value form, e.g. `host=127.0.0.1 port=5432 user=postgres dbname=test`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host={} port={} user={} dbname={}",
            self.host, self.port, self.user, self.database
        )
    }
}

/// Optional replacements for [`ConnectionParams`] fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub database: Option<String>,
}

impl ConnectionOverrides {
    pub fn database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }
}
