use super::{ReadinessProbe, DEFAULT_PROBE_TIMEOUT};
use crate::connection::ConnectionParams;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Ready once a TCP connection to `host:port` succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self, params: &ConnectionParams) -> bool {
        let connect = TcpStream::connect((params.host.as_str(), params.port));
        matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
    }
}
