use super::ReadinessProbe;
use crate::connection::ConnectionParams;
use async_trait::async_trait;
use std::path::PathBuf;

/// Ready once a file appears, e.g. a unix socket or a pid file the server
/// writes after it finished booting. Connection parameters are ignored.
#[derive(Debug, Clone)]
pub struct PathProbe {
    path: PathBuf,
}

impl PathProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReadinessProbe for PathProbe {
    async fn is_ready(&self, _params: &ConnectionParams) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}
