//! Engine capability interface.
//!
//! [`ServiceInstance`](crate::instance::ServiceInstance) drives the lifecycle;
//! an [`Engine`] supplies everything server-specific: where its binaries are,
//! how the data directory is initialized, the command line, the readiness
//! check and the post-start hook.

mod postgres;

pub use postgres::{PostgresConfig, PostgresEngine};

use crate::connection::ConnectionParams;
use crate::error::Result;
use crate::instance::Layout;
use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Subdirectories most engines need: server state and a socket directory.
pub const DEFAULT_SUBDIRECTORIES: &[&str] = &["data", "tmp"];

#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Short name, used for log messages and the boot log file name.
    fn name(&self) -> &str;

    /// Scheme of [`ServiceInstance::url`](crate::instance::ServiceInstance::url).
    fn url_scheme(&self) -> &str;

    /// Fill in executable paths that were not configured explicitly.
    ///
    /// Called before any directory is created; an unresolvable binary must be
    /// reported as [`Error::Configuration`](crate::Error::Configuration).
    fn resolve_executables(&mut self) -> Result<()>;

    /// Directories created under the base directory with mode 0700.
    fn subdirectories(&self) -> &[&str] {
        DEFAULT_SUBDIRECTORIES
    }

    fn data_directory(&self, base_dir: &Path) -> PathBuf {
        base_dir.join("data")
    }

    fn socket_directory(&self, base_dir: &Path) -> PathBuf {
        base_dir.join("tmp")
    }

    fn log_file(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(format!("{}.log", self.name()))
    }

    /// One-time initialization of the data directory.
    ///
    /// Must be a no-op when the directory is already initialized (cloned data
    /// or a second provision).
    async fn initialize(&self, _layout: &Layout) -> Result<()> {
        Ok(())
    }

    fn command_line(&self, layout: &Layout, port: u16) -> Result<CommandLine>;

    /// Default connection parameters for a server listening on `port`.
    fn connection(&self, port: u16) -> ConnectionParams;

    async fn is_ready(&self, layout: &Layout, params: &ConnectionParams) -> bool;

    /// Runs once the server is ready, e.g. to create a default database.
    /// Must be idempotent: it runs on every start.
    async fn post_start(&self, _layout: &Layout, _params: &ConnectionParams) -> Result<()> {
        Ok(())
    }

    /// Signal used by a plain `stop()`.
    fn stop_signal(&self) -> Signal {
        Signal::SIGINT
    }
}

/// Program plus ordered arguments for spawning a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a free-form argument string, split on whitespace.
    pub fn extra_args(mut self, extra: &str) -> Self {
        self.args
            .extend(extra.split_whitespace().map(OsString::from));
        self
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
