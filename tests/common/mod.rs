//! Shared fixtures for integration tests.
//!
//! [`ScriptEngine`] runs a `/bin/sh` script as the "server", so lifecycle
//! behaviour can be tested without a database installed. The script gets
//! `$0` = base dir, `$1` = data dir, `$2` = port, and signals readiness by
//! creating `$0/ready`.

#![allow(dead_code)]

use async_trait::async_trait;
use ephemeral_service::{
    CommandLine, ConnectionParams, Engine, Error, InstanceConfig, Layout, PathProbe, ReadinessProbe,
    Result, SearchPaths,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Becomes ready at once, removes its ready marker and exits 0 on SIGINT/SIGTERM.
pub const SERVE_SCRIPT: &str = r#"
trap 'rm -f "$0/ready"; exit 0' INT TERM
touch "$0/ready"
while :; do sleep 1 & wait $!; done
"#;

/// Never becomes ready.
pub const HANG_SCRIPT: &str = "exec sleep 30";

/// Exits during startup with a message in the log.
pub const CRASH_SCRIPT: &str = r#"echo "FATAL: boom" >&2; exit 3"#;

/// Becomes ready but ignores SIGINT.
pub const STUBBORN_SCRIPT: &str = r#"trap '' INT; touch "$0/ready"; exec sleep 30"#;

/// Becomes ready, then exits 0 on its own a second later.
pub const EXITING_SCRIPT: &str = r#"touch "$0/ready"; sleep 1; exit 0"#;

/// File written by `initialize`, the fixture's equivalent of `PG_VERSION`.
pub const INIT_MARKER: &str = "VERSION";

/// File created by `post_start` if missing, the fixture's "default database".
pub const DEFAULT_RESOURCE: &str = "default_resource";

#[derive(Debug, Clone)]
pub struct ScriptEngine {
    script: String,
    shell: Option<PathBuf>,
    search_paths: SearchPaths,
    fail_initialize: bool,
    initialized: Arc<AtomicUsize>,
    resources_created: Arc<AtomicUsize>,
    post_starts: Arc<AtomicUsize>,
}

impl ScriptEngine {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            shell: None,
            search_paths: SearchPaths::default(),
            fail_initialize: false,
            initialized: Arc::new(AtomicUsize::new(0)),
            resources_created: Arc::new(AtomicUsize::new(0)),
            post_starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn serving() -> Self {
        Self::new(SERVE_SCRIPT)
    }

    /// Initialization writes a partial data directory, then fails.
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn with_search_paths(mut self, search_paths: SearchPaths) -> Self {
        self.search_paths = search_paths;
        self
    }

    /// Number of times the data directory was initialized from scratch.
    pub fn init_count(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn resources_created(&self) -> usize {
        self.resources_created.load(Ordering::SeqCst)
    }

    pub fn post_start_count(&self) -> usize {
        self.post_starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for ScriptEngine {
    fn name(&self) -> &str {
        "script"
    }

    fn url_scheme(&self) -> &str {
        "script"
    }

    fn resolve_executables(&mut self) -> Result<()> {
        if self.shell.is_none() {
            self.shell = Some(self.search_paths.find_program("sh", &["bin"])?);
        }
        Ok(())
    }

    async fn initialize(&self, layout: &Layout) -> Result<()> {
        let marker = layout.data_dir.join(INIT_MARKER);
        if tokio::fs::try_exists(&marker).await? {
            return Ok(());
        }
        if self.fail_initialize {
            tokio::fs::write(layout.data_dir.join("partial"), "").await?;
            return Err(Error::Provisioning("initialization failed".to_string()));
        }
        tokio::fs::write(&marker, "1\n").await?;
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn command_line(&self, layout: &Layout, port: u16) -> Result<CommandLine> {
        let shell = self.shell.clone().unwrap_or_else(|| PathBuf::from("/bin/sh"));
        Ok(CommandLine::new(shell)
            .arg("-c")
            .arg(&self.script)
            .arg(&layout.base_dir)
            .arg(&layout.data_dir)
            .arg(port.to_string()))
    }

    fn connection(&self, port: u16) -> ConnectionParams {
        ConnectionParams::new(port, "tester", "default")
    }

    async fn is_ready(&self, layout: &Layout, params: &ConnectionParams) -> bool {
        PathProbe::new(layout.base_dir.join("ready"))
            .is_ready(params)
            .await
    }

    async fn post_start(&self, layout: &Layout, _params: &ConnectionParams) -> Result<()> {
        self.post_starts.fetch_add(1, Ordering::SeqCst);
        let resource = layout.data_dir.join(DEFAULT_RESOURCE);
        if !tokio::fs::try_exists(&resource).await? {
            tokio::fs::write(&resource, "").await?;
            self.resources_created.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Short timeouts so failure paths finish quickly.
pub fn fast_config() -> InstanceConfig {
    InstanceConfig::default()
        .with_start_timeout(Duration::from_secs(5))
        .with_stop_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(20))
}

pub fn is_pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}
