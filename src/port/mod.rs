use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, TcpListener};

/// Hands out ephemeral ports for servers that need a fixed listening port.
///
/// The listener used to discover the port is dropped before returning, so a
/// different process may grab the port before the server binds it. That
/// window is narrow and accepted; callers that lose the race see a launch
/// failure with the server's "address in use" message in the log.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    host: IpAddr,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    pub fn with_host(host: IpAddr) -> Self {
        Self { host }
    }

    /// Bind to port 0 and return the port the OS picked.
    pub fn allocate(&self) -> Result<u16> {
        let listener = TcpListener::bind((self.host, 0))
            .map_err(|e| Error::PortAllocation(format!("Failed to bind to random port: {}", e)))?;

        let port = listener
            .local_addr()
            .map_err(|e| Error::PortAllocation(format!("Failed to get local address: {}", e)))?
            .port();

        drop(listener);
        tracing::trace!("Allocated port {} on {}", port, self.host);
        Ok(port)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}
