use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`ServiceInstance`](super::ServiceInstance).
///
/// ```text
/// New ──► Provisioned ──► Starting ──► Running ──► Stopping ──► Stopped ──► Cleaned
///                            ▲                                     │
///                            └─────────────────────────────────────┘
/// ```
///
/// `New` may skip straight to `Starting` (auto-start level 1) or to
/// `Cleaned`. `Starting` may go to `Stopping` when the launch fails, and
/// `Starting` or `Running` go straight to `Stopped` when the process exits
/// on its own.
/// `Cleaned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Constructed; nothing on disk besides the base directory.
    New,
    /// Directory tree created and data directory initialized or cloned.
    Provisioned,
    /// Process spawned, readiness not yet confirmed.
    Starting,
    /// Process passed its readiness probe.
    Running,
    /// Shutdown signal sent.
    Stopping,
    /// Process gone; the directory tree may still exist.
    Stopped,
    /// Owned temp directory removed.
    Cleaned,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::New => write!(f, "new"),
            Lifecycle::Provisioned => write!(f, "provisioned"),
            Lifecycle::Starting => write!(f, "starting"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Stopping => write!(f, "stopping"),
            Lifecycle::Stopped => write!(f, "stopped"),
            Lifecycle::Cleaned => write!(f, "cleaned"),
        }
    }
}

impl Lifecycle {
    /// Check if a state transition is allowed.
    ///
    /// ```
    /// use ephemeral_service::instance::Lifecycle;
    ///
    /// assert!(Lifecycle::New.is_valid_transition(Lifecycle::Provisioned));
    /// assert!(Lifecycle::Stopped.is_valid_transition(Lifecycle::Starting));
    /// assert!(!Lifecycle::Cleaned.is_valid_transition(Lifecycle::Starting));
    /// ```
    pub fn is_valid_transition(&self, to: Lifecycle) -> bool {
        use Lifecycle::*;
        match (self, to) {
            // Cleaned is terminal
            (Cleaned, _) => false,

            (New | Stopped, Provisioned) => true,

            // Start without provisioning (auto_start = 1, or a cloned base dir)
            (New | Provisioned | Stopped, Starting) => true,

            (Starting, Running) => true,

            // A failed start tears down from Starting
            (Starting | Running, Stopping) => true,
            (Stopping, Stopped) => true,

            // Process exited on its own
            (Starting | Running, Stopped) => true,

            // cleanup() without a tracked process
            (New | Provisioned | Stopped, Cleaned) => true,

            (s1, s2) if *s1 == s2 => true,

            _ => false,
        }
    }

    /// Whether `provision()`/`start()` may still be called.
    pub fn is_usable(&self) -> bool {
        *self != Lifecycle::Cleaned
    }
}
