// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(ephemeral::config::error),
        help("Install the server binaries, put them on PATH, or set the executable paths explicitly")
    )]
    Configuration(String),

    #[error("Provisioning error: {0}")]
    #[diagnostic(code(ephemeral::provision::error))]
    Provisioning(String),

    #[error("*** failed to launch {service} ({reason}) ***\n{log}")]
    #[diagnostic(
        code(ephemeral::launch::failed),
        help("The server log above usually names the cause (port in use, bad argument, permissions)")
    )]
    Launch {
        service: String,
        reason: String,
        log: String,
    },

    #[error("*** failed to shutdown {service} within {timeout:?} (killed) ***\n{log}")]
    #[diagnostic(code(ephemeral::shutdown::timeout))]
    ShutdownTimeout {
        service: String,
        timeout: Duration,
        log: String,
    },

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(ephemeral::filesystem::error))]
    Filesystem(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Port allocation failed: {0}")]
    #[diagnostic(code(ephemeral::port::allocation_failed))]
    PortAllocation(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(ephemeral::database::error))]
    Database(#[from] sqlx::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid lifecycle operation: {0}")]
    Lifecycle(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Configuration(msg) if msg.contains("command not found") => Some(
                "Add the server's bin directory to PATH or pass the executable path in the engine config"
                    .to_string(),
            ),
            Error::Configuration(_) => Some("Check ephemeral.yaml and the command line flags".to_string()),
            Error::Provisioning(msg) if msg.contains("initdb") => Some(
                "initdb refuses to run as root; run the tests as an unprivileged user".to_string(),
            ),
            Error::Launch { reason, .. } if reason == "timeout" => Some(
                "The server did not become ready in time. Raise start_timeout if the machine is slow"
                    .to_string(),
            ),
            Error::ShutdownTimeout { .. } => Some(
                "The server ignored the shutdown signal. Raise stop_timeout or check for stuck clients"
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, service_name: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for '{}' (refers to process group, not a process)",
                service_name
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal PID 1 (init) for '{}'", service_name),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for '{}', cannot convert safely",
                pid, service_name
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}
