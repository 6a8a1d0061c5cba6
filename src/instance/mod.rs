//! Lifecycle of one managed server process.
//!
//! A [`ServiceInstance`] owns a base directory (caller-supplied or a fresh
//! temp dir), provisions the data directory inside it, spawns the server,
//! waits for its readiness probe and tears everything down again.
//!
//! # Ownership
//!
//! The id of the constructing process is recorded. Only that process may
//! signal the server: a forked child that inherited the struct sees a
//! different id and turns `terminate()` into a no-op, and `cleanup()` never
//! runs while a pid is tracked.
//!
//! # Teardown
//!
//! [`ServiceInstance::scoped`] is the reliable way to guarantee teardown.
//! `Drop` only performs a best-effort blocking stop.

mod boot_log;
mod layout;
mod state;

pub use layout::{Layout, OWNER_ONLY};
pub use state::Lifecycle;

use crate::config::InstanceConfig;
use crate::connection::{ConnectionOverrides, ConnectionParams};
use crate::engine::Engine;
use crate::error::{validate_pid, Error, Result};
use crate::port::PortAllocator;
use boot_log::BootLog;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use nix::sys::signal::{self, Signal};
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Child;
use tokio::time::Instant;

/// How long to wait for the kernel to reap a process after SIGKILL.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ServiceInstance<E: Engine> {
    engine: E,
    config: InstanceConfig,
    layout: Layout,
    uses_temp_dir: bool,
    owner_pid: u32,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    state: Lifecycle,
}

impl<E: Engine> ServiceInstance<E> {
    /// Resolve executables, set up the base directory and run the configured
    /// amount of the lifecycle.
    ///
    /// Nothing touches the filesystem if executable resolution fails. If an
    /// auto-start step fails, the instance is stopped before the error is
    /// returned.
    pub async fn new(mut engine: E, config: InstanceConfig) -> Result<Self> {
        engine.resolve_executables()?;

        let (base_dir, uses_temp_dir) = match config.base_dir {
            Some(ref dir) => (absolute_base_dir(dir)?, false),
            None => (create_temp_base_dir(engine.name())?, true),
        };
        let layout = Layout::new(&engine, &base_dir);
        tracing::debug!(
            "Created {} instance in {} (temporary: {})",
            engine.name(),
            base_dir.display(),
            uses_temp_dir
        );

        let mut instance = Self {
            engine,
            config,
            layout,
            uses_temp_dir,
            owner_pid: std::process::id(),
            child: None,
            pid: None,
            started_at: None,
            state: Lifecycle::New,
        };

        if let Err(e) = instance.auto_start().await {
            if let Err(stop_err) = instance.stop().await {
                tracing::warn!("Failed to stop {} after failed start: {}", instance.name(), stop_err);
            }
            return Err(e);
        }
        Ok(instance)
    }

    async fn auto_start(&mut self) -> Result<()> {
        if self.config.auto_start.provisions() {
            self.provision().await?;
        }
        if self.config.auto_start.starts() {
            self.start().await?;
        }
        Ok(())
    }

    /// Create the directory tree and initialize the data directory.
    ///
    /// With `copy_data_from` set, the source is cloned first and the engine's
    /// one-time initialization then sees an initialized directory and skips
    /// itself. Cloning fails if the data directory already exists.
    #[tracing::instrument(skip(self), fields(service = %self.engine.name()))]
    pub async fn provision(&mut self) -> Result<()> {
        self.ensure_usable("provision")?;
        if !self.state.is_valid_transition(Lifecycle::Provisioned) {
            return Err(Error::Lifecycle(format!(
                "cannot provision {} while it is {}",
                self.name(),
                self.state
            )));
        }

        // Only the first provisioning clones; a restart reuses the copy.
        if let Some(source) = self.config.copy_data_from.clone() {
            if self.state == Lifecycle::New {
                tracing::debug!(
                    "Cloning {} into {}",
                    source.display(),
                    self.layout.data_dir.display()
                );
                layout::clone_data_dir(&source, &self.layout).await?;
            }
        }

        self.layout.create_subdirectories()?;

        if let Err(e) = self.engine.initialize(&self.layout).await {
            self.cleanup();
            return Err(e);
        }

        self.set_state(Lifecycle::Provisioned);
        Ok(())
    }

    /// Spawn the server and wait until it passes its readiness probe.
    ///
    /// Does nothing if a process is already tracked. A port is allocated on
    /// first start and kept for later restarts.
    #[tracing::instrument(skip(self), fields(service = %self.engine.name()))]
    pub async fn start(&mut self) -> Result<()> {
        if self.pid.is_some() {
            tracing::debug!("{} already running (pid {:?})", self.name(), self.pid);
            return Ok(());
        }
        self.ensure_usable("start")?;

        let port = match self.config.port {
            Some(port) => port,
            None => {
                let port = PortAllocator::new().allocate()?;
                self.config.port = Some(port);
                port
            }
        };

        let command_line = self.engine.command_line(&self.layout, port)?;
        std::fs::create_dir_all(&self.layout.base_dir)?;
        let (stdout, stderr) = BootLog::create(&self.layout.log_path)?.into_stdio();

        let mut command = command_line.to_command();
        command
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false);

        tracing::debug!("Spawning {}", command_line);
        let child = command.spawn().map_err(|e| Error::Launch {
            service: self.name().to_string(),
            reason: format!("failed to spawn {}: {}", command_line.program.display(), e),
            log: String::new(),
        })?;
        let pid = child.id().ok_or_else(|| Error::Launch {
            service: self.name().to_string(),
            reason: "process exited before its pid was read".to_string(),
            log: String::new(),
        })?;

        self.child = Some(child);
        self.pid = Some(pid);
        self.started_at = Some(Utc::now());
        self.set_state(Lifecycle::Starting);

        if let Err(e) = self.wait_until_ready(port).await {
            self.stop_after_failed_start().await;
            return Err(e);
        }
        self.set_state(Lifecycle::Running);

        let params = self.engine.connection(port);
        if let Err(e) = self.engine.post_start(&self.layout, &params).await {
            self.stop_after_failed_start().await;
            return Err(e);
        }

        tracing::info!("{} ready on port {} (pid {})", self.name(), port, pid);
        Ok(())
    }

    async fn wait_until_ready(&mut self, port: u16) -> Result<()> {
        let params = self.engine.connection(port);
        let deadline = Instant::now() + self.config.start_timeout;

        loop {
            if let Some(status) = self.try_exit_status()? {
                self.untrack();
                self.set_state(Lifecycle::Stopped);
                return Err(self.launch_error(status.to_string()).await);
            }
            if self.engine.is_ready(&self.layout, &params).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(self.launch_error("timeout".to_string()).await);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn stop_after_failed_start(&mut self) {
        if let Err(e) = self.stop().await {
            tracing::warn!("Failed to stop {} after failed start: {}", self.name(), e);
        }
    }

    async fn launch_error(&self, reason: String) -> Error {
        Error::Launch {
            service: self.name().to_string(),
            reason,
            log: boot_log::read(&self.layout.log_path).await,
        }
    }

    /// Stop the server with the engine's default signal, then clean up.
    pub async fn stop(&mut self) -> Result<()> {
        let signal = self.engine.stop_signal();
        self.stop_with_signal(signal).await
    }

    /// Terminate with `signal`, then clean up. Cleanup is attempted even if
    /// termination fails; the termination error is returned afterwards.
    #[tracing::instrument(skip(self), fields(service = %self.engine.name()))]
    pub async fn stop_with_signal(&mut self, signal: Signal) -> Result<()> {
        let result = self.terminate(signal).await;
        self.cleanup();
        result
    }

    /// Signal the server and wait for it to exit, escalating to SIGKILL once
    /// after `stop_timeout`.
    ///
    /// No-op without a tracked process or when called from a process other
    /// than the one that constructed the instance.
    pub async fn terminate(&mut self, signal: Signal) -> Result<()> {
        let Some(raw_pid) = self.pid else {
            return Ok(());
        };
        if std::process::id() != self.owner_pid {
            tracing::debug!(
                "Not terminating {} (pid {}): owned by process {}",
                self.name(),
                raw_pid,
                self.owner_pid
            );
            return Ok(());
        }

        let pid = validate_pid(raw_pid, self.name())?;

        // Never signal a pid that has already been reaped.
        if let Some(status) = self.try_exit_status()? {
            tracing::debug!("{} (pid {}) already exited: {}", self.name(), raw_pid, status);
            self.untrack();
            self.set_state(Lifecycle::Stopped);
            return Ok(());
        }
        self.set_state(Lifecycle::Stopping);

        // The process may already be gone; exit is confirmed by the wait below.
        if let Err(e) = signal::kill(pid, signal) {
            tracing::debug!("Sending {} to pid {} failed: {}", signal, raw_pid, e);
        }

        let deadline = Instant::now() + self.config.stop_timeout;
        loop {
            if self.try_exit_status()?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(self.kill_after_timeout(pid).await);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        self.untrack();
        self.set_state(Lifecycle::Stopped);
        tracing::info!("{} stopped (pid {})", self.name(), raw_pid);
        Ok(())
    }

    async fn kill_after_timeout(&mut self, pid: nix::unistd::Pid) -> Error {
        tracing::warn!(
            "{} (pid {}) did not exit within {:?}, sending SIGKILL",
            self.name(),
            pid,
            self.config.stop_timeout
        );
        let _ = signal::kill(pid, Signal::SIGKILL);

        if let Some(child) = self.child.as_mut() {
            match tokio::time::timeout(KILL_REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(_)) => {
                    self.untrack();
                    self.set_state(Lifecycle::Stopped);
                }
                Ok(Err(e)) => tracing::warn!("Error waiting for killed {}: {}", pid, e),
                Err(_) => tracing::warn!("pid {} still present after SIGKILL", pid),
            }
        }

        Error::ShutdownTimeout {
            service: self.name().to_string(),
            timeout: self.config.stop_timeout,
            log: boot_log::read(&self.layout.log_path).await,
        }
    }

    /// Remove the base directory if it is an owned temp dir.
    ///
    /// No-op while a process is tracked. Removal errors are logged and
    /// ignored; caller-supplied directories are never removed.
    pub fn cleanup(&mut self) {
        if self.pid.is_some() || !self.uses_temp_dir {
            return;
        }

        let base_dir = &self.layout.base_dir;
        if base_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(base_dir) {
                tracing::warn!("Failed to remove {}: {}", base_dir.display(), e);
            } else {
                tracing::debug!("Removed {}", base_dir.display());
            }
        }
        self.uses_temp_dir = false;
        self.set_state(Lifecycle::Cleaned);
    }

    /// Run `f` against this instance and stop it afterwards.
    ///
    /// The instance is stopped whether `f` returns `Ok`, `Err` or panics; a
    /// panic is resumed once the stop has finished. An error from `f` takes
    /// precedence over an error from stopping.
    ///
    /// ```no_run
    /// # use ephemeral_service::{InstanceConfig, PostgresEngine, ServiceInstance};
    /// # use futures::FutureExt;
    /// # async fn demo() -> ephemeral_service::Result<()> {
    /// let mut pg = ServiceInstance::new(PostgresEngine::default(), InstanceConfig::default()).await?;
    /// let url = pg.scoped(|pg| async move { pg.url() }.boxed()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>>,
    {
        let outcome = AssertUnwindSafe(f(self)).catch_unwind().await;
        let stopped = self.stop().await;

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(e)) => {
                if let Err(stop_err) = stopped {
                    tracing::warn!("Failed to stop {}: {}", self.name(), stop_err);
                }
                Err(e)
            }
            Ok(Ok(value)) => stopped.map(|()| value),
        }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> Option<u16> {
        self.config.port
    }

    pub fn base_dir(&self) -> &Path {
        &self.layout.base_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.layout.data_dir
    }

    pub fn uses_temp_dir(&self) -> bool {
        self.uses_temp_dir
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether the tracked process is still running.
    ///
    /// A process found to have exited is reaped and no longer tracked, and
    /// the instance moves to `Stopped`.
    pub fn is_alive(&mut self) -> bool {
        if self.pid.is_none() {
            return false;
        }
        match self.try_exit_status() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!("{} exited unexpectedly: {}", self.name(), status);
                self.untrack();
                self.set_state(Lifecycle::Stopped);
                false
            }
            Err(e) => {
                tracing::debug!("Could not check {}: {}", self.name(), e);
                false
            }
        }
    }

    /// Current contents of the server's log file.
    pub async fn read_boot_log(&self) -> String {
        boot_log::read(&self.layout.log_path).await
    }

    /// Connection parameters for the running server.
    pub fn connection(&self) -> Result<ConnectionParams> {
        let port = self.config.port.ok_or_else(|| {
            Error::Lifecycle(format!("{} has no port assigned yet", self.name()))
        })?;
        Ok(self.engine.connection(port))
    }

    pub fn connection_with(&self, overrides: &ConnectionOverrides) -> Result<ConnectionParams> {
        Ok(self.connection()?.with_overrides(overrides))
    }

    /// `scheme://user@host:port/database` for the default database.
    pub fn url(&self) -> Result<String> {
        Ok(self.connection()?.url(self.engine.url_scheme()))
    }

    fn ensure_usable(&self, operation: &str) -> Result<()> {
        if self.state.is_usable() {
            Ok(())
        } else {
            Err(Error::Lifecycle(format!(
                "cannot {} {}: instance has been cleaned up",
                operation,
                self.name()
            )))
        }
    }

    fn set_state(&mut self, to: Lifecycle) {
        if self.state == to {
            return;
        }
        if !self.state.is_valid_transition(to) {
            tracing::warn!("Unexpected transition of {}: {} -> {}", self.name(), self.state, to);
        }
        tracing::debug!("{}: {} -> {}", self.name(), self.state, to);
        self.state = to;
    }

    /// Non-blocking exit check on the tracked child, retried on EINTR.
    fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        loop {
            match child.try_wait() {
                Ok(status) => return Ok(status),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn untrack(&mut self) {
        self.child = None;
        self.pid = None;
    }
}

impl<E: Engine> Drop for ServiceInstance<E> {
    /// Blocking best-effort stop for instances that were never stopped.
    fn drop(&mut self) {
        if std::process::id() != self.owner_pid {
            return;
        }

        if let (Some(raw_pid), Some(child)) = (self.pid, self.child.as_mut()) {
            tracing::debug!("Stopping {} (pid {}) on drop", self.engine.name(), raw_pid);
            if let Ok(pid) = validate_pid(raw_pid, self.engine.name()) {
                let _ = signal::kill(pid, self.engine.stop_signal());
            }

            let deadline = std::time::Instant::now() + self.config.stop_timeout;
            let mut exited = wait_blocking(child, deadline, self.config.poll_interval);
            if !exited {
                tracing::warn!(
                    "{} (pid {}) did not exit on drop, killing it\n{}",
                    self.engine.name(),
                    raw_pid,
                    boot_log::read_blocking(&self.layout.log_path)
                );
                let _ = child.start_kill();
                exited = wait_blocking(
                    child,
                    std::time::Instant::now() + KILL_REAP_TIMEOUT,
                    self.config.poll_interval,
                );
            }
            if !exited {
                // Leave the directory; the process may still be writing to it.
                return;
            }
            self.untrack();
        }

        self.cleanup();
    }
}

fn wait_blocking(child: &mut Child, deadline: std::time::Instant, poll: Duration) -> bool {
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if std::time::Instant::now() >= deadline => return false,
            Ok(None) => std::thread::sleep(poll),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return false,
        }
    }
}

fn absolute_base_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn create_temp_base_dir(prefix: &str) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("{}-", prefix))
        .tempdir()
        .map_err(|e| Error::Filesystem(format!("Failed to create temp directory: {}", e)))?;
    Ok(dir.keep())
}
