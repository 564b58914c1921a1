//! Forwarding of raw queries to the upstream resolver.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::dns::{HEADER_LEN, transaction_id};
use crate::error::{Error, Result};
use crate::transport::MAX_DNS_PACKET_SIZE;

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Upstream DNS resolver reached over UDP.
#[derive(Debug, Clone, Copy)]
pub struct Upstream {
    addr: SocketAddr,
    timeout: Duration,
}

impl Upstream {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Forward `query` unchanged and wait for the reply that carries the
    /// same transaction ID.
    ///
    /// Each exchange uses its own ephemeral socket connected to the upstream,
    /// so datagrams from other hosts never reach it. Replies with a different
    /// ID are discarded until the timeout runs out.
    pub async fn exchange(&self, query: &[u8]) -> Result<Vec<u8>> {
        self.try_exchange(query)
            .await
            .map_err(|source| Error::UpstreamUnavailable {
                upstream: self.addr,
                source,
            })
    }

    async fn try_exchange(&self, query: &[u8]) -> io::Result<Vec<u8>> {
        let id = transaction_id(query)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "query too short"))?;

        let local: SocketAddr = if self.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr).await?;
        socket.send(query).await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];

        loop {
            let len = timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no reply within {:?}", self.timeout),
                    )
                })??;

            if len >= HEADER_LEN && transaction_id(&buf[..len]) == Some(id) {
                buf.truncate(len);
                return Ok(buf);
            }
            debug!(upstream = %self.addr, len, "Discarding unmatched upstream datagram");
        }
    }
}
