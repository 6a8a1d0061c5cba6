//! The server's stdout/stderr file.
//!
//! Truncated on every start and embedded in launch and shutdown errors, so
//! the cause of a failure travels with the error value.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;

/// Open handles for the child's stdout and stderr, both pointing at `path`.
pub struct BootLog {
    stdout: File,
    stderr: File,
}

impl BootLog {
    /// Create or truncate the log file.
    pub fn create(path: &Path) -> Result<Self> {
        let stdout = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                Error::Filesystem(format!("Failed to open log file {}: {}", path.display(), e))
            })?;
        let stderr = stdout.try_clone()?;
        Ok(Self { stdout, stderr })
    }

    pub fn into_stdio(self) -> (Stdio, Stdio) {
        (Stdio::from(self.stdout), Stdio::from(self.stderr))
    }
}

/// Contents of the log, or an empty string if it is missing or unreadable.
pub async fn read(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!("Could not read log file {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Blocking variant for `Drop`.
pub fn read_blocking(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
