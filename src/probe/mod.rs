//! Readiness probes.
//!
//! A probe answers one question during the startup wait loop: is the server
//! accepting connections yet? Probes never fail; any error while checking is
//! reported as "not ready" and the loop tries again on the next tick.

mod path;
mod postgres;
mod tcp;

pub use path::PathProbe;
pub use postgres::PostgresProbe;
pub use tcp::TcpProbe;

use crate::connection::ConnectionParams;
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound for a single probe attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Whether the server behind `params` accepts connections right now.
    async fn is_ready(&self, params: &ConnectionParams) -> bool;
}
