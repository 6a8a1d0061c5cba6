use super::{CommandLine, Engine};
use crate::config::SearchPaths;
use crate::connection::ConnectionParams;
use crate::error::{Error, Result};
use crate::instance::Layout;
use crate::probe::{PostgresProbe, ReadinessProbe};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{ConnectOptions, Connection};
use std::path::PathBuf;
use std::process::Stdio;

/// File initdb writes into a fresh cluster; its presence means "initialized".
const INIT_MARKER: &str = "PG_VERSION";

/// Maintenance database used by the default-database hook.
const ADMIN_DATABASE: &str = "postgres";

/// PostgreSQL settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Path to `initdb`; looked up when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initdb: Option<PathBuf>,

    /// Path to `postgres`; looked up when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PathBuf>,

    pub initdb_args: String,

    pub postgres_args: String,

    /// Database created after start if missing.
    pub database: String,

    pub user: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            initdb: None,
            postgres: None,
            initdb_args: "-U postgres -A trust".to_string(),
            postgres_args: "-h 127.0.0.1 -F -c logging_collector=off".to_string(),
            database: "test".to_string(),
            user: "postgres".to_string(),
        }
    }
}

/// Runs a throwaway PostgreSQL cluster.
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    config: PostgresConfig,
    search_paths: SearchPaths,
    probe: PostgresProbe,
}

impl PostgresEngine {
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config,
            search_paths: SearchPaths::postgres(),
            probe: PostgresProbe::default(),
        }
    }

    pub fn with_search_paths(mut self, search_paths: SearchPaths) -> Self {
        self.search_paths = search_paths;
        self
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    pub fn search_paths(&self) -> &SearchPaths {
        &self.search_paths
    }

    /// Whether `initdb` and `postgres` can both be found. Tests use this to
    /// skip themselves on machines without PostgreSQL.
    pub fn is_installed(&self) -> bool {
        self.clone().resolve_executables().is_ok()
    }

    fn postgres_binary(&self) -> Result<&PathBuf> {
        self.config.postgres.as_ref().ok_or_else(|| {
            Error::Configuration("postgres executable has not been resolved".to_string())
        })
    }

    fn initdb_binary(&self) -> Result<&PathBuf> {
        self.config.initdb.as_ref().ok_or_else(|| {
            Error::Configuration("initdb executable has not been resolved".to_string())
        })
    }
}

impl Default for PostgresEngine {
    fn default() -> Self {
        Self::new(PostgresConfig::default())
    }
}

#[async_trait]
impl Engine for PostgresEngine {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn url_scheme(&self) -> &str {
        "postgresql"
    }

    fn resolve_executables(&mut self) -> Result<()> {
        if self.config.initdb.is_none() {
            self.config.initdb = Some(self.search_paths.find_program("initdb", &["bin"])?);
        }
        if self.config.postgres.is_none() {
            self.config.postgres = Some(self.search_paths.find_program("postgres", &["bin"])?);
        }
        Ok(())
    }

    async fn initialize(&self, layout: &Layout) -> Result<()> {
        if layout.data_dir.join(INIT_MARKER).exists() {
            tracing::debug!(
                "Data directory {} already initialized, skipping initdb",
                layout.data_dir.display()
            );
            return Ok(());
        }

        let initdb = self.initdb_binary()?;
        let cmd = CommandLine::new(initdb)
            .arg("-D")
            .arg(&layout.data_dir)
            .arg("--lc-messages=C")
            .extra_args(&self.config.initdb_args);
        tracing::debug!("Running {}", cmd);

        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Provisioning(format!("failed to spawn initdb: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Provisioning(format!(
                "initdb failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn command_line(&self, layout: &Layout, port: u16) -> Result<CommandLine> {
        Ok(CommandLine::new(self.postgres_binary()?)
            .arg("-p")
            .arg(port.to_string())
            .arg("-D")
            .arg(&layout.data_dir)
            .arg("-k")
            .arg(&layout.socket_dir)
            .extra_args(&self.config.postgres_args))
    }

    fn connection(&self, port: u16) -> ConnectionParams {
        ConnectionParams::new(port, &self.config.user, &self.config.database)
    }

    async fn is_ready(&self, _layout: &Layout, params: &ConnectionParams) -> bool {
        self.probe.is_ready(params).await
    }

    async fn post_start(&self, _layout: &Layout, params: &ConnectionParams) -> Result<()> {
        let options =
            PostgresProbe::connect_options(&params.clone().with_database(ADMIN_DATABASE));
        let mut conn = options.connect().await?;

        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pg_database WHERE datname = $1")
                .bind(&params.database)
                .fetch_one(&mut conn)
                .await?;

        if exists == 0 {
            let statement = format!("CREATE DATABASE {}", quote_identifier(&params.database));
            sqlx::query(&statement).execute(&mut conn).await?;
            tracing::debug!("Created database '{}'", params.database);
        }

        conn.close().await?;
        Ok(())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
