//! Network discovery of the instance listener.
//!
//! The listener advertises itself by broadcasting UDP heartbeat
//! datagrams of the form `"<name>:<ip>"`. Discovery listens for a
//! heartbeat whose advertised name starts with the expected prefix,
//! bounded by a caller-supplied timeout. Malformed datagrams are skipped
//! and the listen continues; this is the only operation in the core with
//! internal retry.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use unik_types::{UnikError, UnikResult};

/// UDP port heartbeat datagrams are broadcast to.
pub const HEARTBEAT_PORT: u16 = 9876;

/// Probes the network for the listener's advertised address.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Resolve the IP address advertised under `name_prefix`, waiting at
    /// most `timeout`.
    async fn discover_address(&self, name_prefix: &str, timeout: Duration) -> UnikResult<String>;
}

/// Heartbeat listener on the local broadcast domain.
#[derive(Clone, Debug)]
pub struct UdpDiscovery {
    port: u16,
}

impl UdpDiscovery {
    pub fn new() -> Self {
        Self {
            port: HEARTBEAT_PORT,
        }
    }

    /// Listen on a non-default port (used by tests).
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for UdpDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discovery for UdpDiscovery {
    async fn discover_address(&self, name_prefix: &str, timeout: Duration) -> UnikResult<String> {
        let socket = UdpSocket::bind(("0.0.0.0", self.port)).await.map_err(|e| {
            UnikError::Discovery(format!("binding heartbeat socket on port {}: {}", self.port, e))
        })?;

        let listen = async {
            let mut buf = [0u8; 1024];
            loop {
                let (len, addr) = socket
                    .recv_from(&mut buf)
                    .await
                    .map_err(|e| UnikError::Discovery(format!("receiving heartbeat: {}", e)))?;

                let Ok(message) = std::str::from_utf8(&buf[..len]) else {
                    tracing::debug!(%addr, "skipping non-utf8 heartbeat datagram");
                    continue;
                };
                let message = message.trim();

                // Expected shape: "<name>:<ip>".
                let Some((name, ip)) = message.split_once(':') else {
                    tracing::debug!(%addr, message, "skipping malformed heartbeat datagram");
                    continue;
                };
                if !name.starts_with(name_prefix) || ip.is_empty() {
                    continue;
                }

                tracing::debug!(name, ip, %addr, "received heartbeat");
                return Ok(ip.to_string());
            }
        };

        match tokio::time::timeout(timeout, listen).await {
            Ok(result) => result,
            Err(_) => Err(UnikError::Discovery(format!(
                "no heartbeat matching prefix {} within {:?}",
                name_prefix, timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_discovers_matching_heartbeat() {
        let port = free_udp_port();
        let discovery = UdpDiscovery::with_port(port);

        let sender = tokio::spawn(async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            // Keep sending until the listener picks one up.
            for _ in 0..50 {
                // First a malformed datagram, which must be skipped.
                let _ = socket.send_to(b"garbage", ("127.0.0.1", port)).await;
                let _ = socket
                    .send_to(b"unik-instance-listener:10.1.2.3", ("127.0.0.1", port))
                    .await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let ip = discovery
            .discover_address("unik-instance-listener", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ip, "10.1.2.3");
        sender.abort();
    }

    #[tokio::test]
    async fn test_times_out_when_no_heartbeat() {
        let port = free_udp_port();
        let discovery = UdpDiscovery::with_port(port);
        let start = std::time::Instant::now();
        let err = discovery
            .discover_address("unik-instance-listener", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, UnikError::Discovery(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
