//! UDP transport for DNS queries.
//!
//! One task is spawned per received datagram, so a slow upstream exchange
//! never holds up other clients. Tasks share nothing but the resolver.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::resolver::{QueryAction, Resolver};
use crate::upstream::Upstream;

use super::{MAX_DNS_PACKET_SIZE, QueryLogger};

/// UDP transport for DNS proxy.
///
/// Binds to a local address and answers or forwards each query it receives.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop on the current runtime.
    pub fn start(self, upstream: Upstream, resolver: Arc<Resolver>, verbose: bool) -> JoinHandle<()> {
        tokio::spawn(run(self.socket, upstream, resolver, QueryLogger::new(verbose)))
    }
}

/// Receive loop: copy each datagram out of the shared buffer and hand it to
/// a fresh task.
async fn run(socket: Arc<UdpSocket>, upstream: Upstream, resolver: Arc<Resolver>, logger: QueryLogger) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        let query = buf[..len].to_vec();
        tokio::spawn(handle_query(
            socket.clone(),
            upstream,
            resolver.clone(),
            logger,
            query,
            src,
        ));
    }
}

async fn handle_query(
    socket: Arc<UdpSocket>,
    upstream: Upstream,
    resolver: Arc<Resolver>,
    logger: QueryLogger,
    query: Vec<u8>,
    src: SocketAddr,
) {
    let start_time = Instant::now();

    if let Err(e) = resolve(&socket, &upstream, &resolver, &logger, &query, src, start_time).await {
        resolver.stats().record_dropped();
        logger.dropped(src, &e);
    }
}

async fn resolve(
    socket: &UdpSocket,
    upstream: &Upstream,
    resolver: &Resolver,
    logger: &QueryLogger,
    query: &[u8],
    src: SocketAddr,
    start_time: Instant,
) -> Result<()> {
    match resolver.process_query(query)? {
        QueryAction::Synthesized { response, domain } => {
            socket.send_to(&response, src).await?;

            let elapsed = millis(start_time);
            resolver.stats().record_synthesized(elapsed);
            logger.synthesized(&domain, src, elapsed);
        }
        QueryAction::Forward { domain } => {
            let upstream_start = Instant::now();
            let response = upstream.exchange(query).await?;
            let upstream_ms = millis(upstream_start);

            match resolver.process_response(&response) {
                Ok(learned) => debug!(domain = %domain, learned, "Cached records from upstream reply"),
                Err(e) => debug!(domain = %domain, error = %e, "Upstream reply not cached"),
            }

            socket.send_to(&response, src).await?;

            let elapsed = millis(start_time);
            resolver.stats().record_forwarded(elapsed);
            logger.forwarded(&domain, src, elapsed, upstream_ms);
        }
        QueryAction::Ignore { domain } => {
            resolver.stats().record_dropped();
            logger.ignored(&domain, src);
        }
    }

    Ok(())
}

fn millis(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
