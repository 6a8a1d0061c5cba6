use super::{ReadinessProbe, TcpProbe, DEFAULT_PROBE_TIMEOUT};
use crate::connection::ConnectionParams;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;

/// Database every cluster has right after initdb; used for the handshake so
/// the probe does not depend on the default database existing yet.
const PROBE_DATABASE: &str = "template1";

/// Ready once a PostgreSQL startup handshake completes.
///
/// A plain TCP connect is tried first so that a closed port costs one
/// syscall instead of a full driver connection attempt. The TCP check alone
/// is not enough: the postmaster accepts connections while still in
/// recovery and answers them with "the database system is starting up".
#[derive(Debug, Clone)]
pub struct PostgresProbe {
    tcp: TcpProbe,
    timeout: Duration,
}

impl PostgresProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tcp: TcpProbe::new(timeout),
            timeout,
        }
    }

    pub(crate) fn connect_options(params: &ConnectionParams) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .database(&params.database)
            .ssl_mode(PgSslMode::Disable)
    }
}

impl Default for PostgresProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn is_ready(&self, params: &ConnectionParams) -> bool {
        if !self.tcp.is_ready(params).await {
            return false;
        }

        let options = Self::connect_options(&params.clone().with_database(PROBE_DATABASE));
        match tokio::time::timeout(self.timeout, options.connect()).await {
            Ok(Ok(conn)) => {
                if let Err(e) = conn.close().await {
                    tracing::trace!("Closing probe connection failed: {}", e);
                }
                true
            }
            Ok(Err(e)) => {
                tracing::trace!("PostgreSQL on port {} not ready: {}", params.port, e);
                false
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_port_is_not_ready() {
        let port = crate::port::PortAllocator::new().allocate().unwrap();
        let params = ConnectionParams::new(port, "postgres", "test");

        assert!(!PostgresProbe::new(Duration::from_millis(200)).is_ready(&params).await);
    }

    #[tokio::test]
    async fn test_non_postgres_listener_is_not_ready() {
        // Accepts the TCP connection and hangs up without speaking the protocol.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });
        let params = ConnectionParams::new(port, "postgres", "test");

        assert!(!PostgresProbe::new(Duration::from_millis(500)).is_ready(&params).await);
    }
}
