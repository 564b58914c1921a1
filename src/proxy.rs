//! DNS proxy orchestration.
//!
//! Restores the record cache, binds the UDP transport, runs the periodic
//! expiry sweep, and writes the cache back out on shutdown.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{RecordCache, SystemClock};
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::transport::udp::UdpTransport;
use crate::upstream::{DEFAULT_UPSTREAM_TIMEOUT, Upstream};

pub const DEFAULT_PORT: u16 = 1025;
pub const DEFAULT_UPSTREAM: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);
pub const DEFAULT_SNAPSHOT_PATH: &str = "cache.json";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the DNS proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:1025)
    pub bind_addr: SocketAddr,
    /// Upstream resolver queries are forwarded to
    pub upstream: SocketAddr,
    /// How long to wait for an upstream reply before dropping the query
    pub upstream_timeout: Duration,
    /// Cache snapshot, read at startup and written at shutdown
    pub snapshot_path: PathBuf,
    /// Period of the expiry sweep. Must be non-zero.
    pub sweep_interval: Duration,
    /// Period of the stats report; `None` disables it
    pub stats_interval: Option<Duration>,
    /// Log every query (domain, outcome, timing)
    pub verbose: bool,
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            bind_addr,
            upstream,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stats_interval: Some(DEFAULT_STATS_INTERVAL),
            verbose: false,
        }
    }

    /// Reject periods the background loops cannot tick at.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig("sweep_interval must be non-zero"));
        }
        if self.stats_interval.is_some_and(|p| p.is_zero()) {
            return Err(Error::InvalidConfig("stats_interval must be non-zero, use None to disable"));
        }
        Ok(())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new((Ipv4Addr::LOCALHOST, DEFAULT_PORT).into(), DEFAULT_UPSTREAM)
    }
}

/// A bound proxy, ready to serve.
pub struct Proxy {
    config: ProxyConfig,
    transport: UdpTransport,
    resolver: Arc<Resolver>,
}

impl Proxy {
    /// Restore the cache from the configured snapshot and bind the listener.
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        let cache = RecordCache::load_snapshot(&config.snapshot_path, Arc::new(SystemClock));
        Self::with_cache(config, Arc::new(cache)).await
    }

    /// Bind the listener around an existing cache. The snapshot is still
    /// written to `config.snapshot_path` on shutdown.
    pub async fn with_cache(config: ProxyConfig, cache: Arc<RecordCache>) -> Result<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_addr).await?;

        Ok(Self {
            config,
            transport,
            resolver: Arc::new(Resolver::new(cache)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    pub fn cache(&self) -> Arc<RecordCache> {
        self.resolver.cache().clone()
    }

    /// Serve queries until `shutdown` completes, then save the cache
    /// snapshot.
    ///
    /// Queries still in flight when `shutdown` completes may finish after
    /// the snapshot has been written; whatever they learn is not persisted.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = self.transport.local_addr()?;
        info!(
            bind = %local_addr,
            upstream = %self.config.upstream,
            cached = self.resolver.cache_len(),
            "DNS proxy listening"
        );

        let upstream = Upstream::new(self.config.upstream, self.config.upstream_timeout);
        let cache = self.resolver.cache().clone();

        let mut tasks = vec![
            self.transport
                .start(upstream, self.resolver.clone(), self.config.verbose),
            tokio::spawn(sweep_loop(cache.clone(), self.config.sweep_interval)),
        ];
        if let Some(period) = self.config.stats_interval {
            tasks.push(tokio::spawn(stats_loop(self.resolver.clone(), period)));
        }

        shutdown.await;
        info!("Shutting down");
        for task in &tasks {
            task.abort();
        }

        let path = &self.config.snapshot_path;
        match cache.save_snapshot(path) {
            Ok(saved) => {
                info!(path = %path.display(), entries = saved, "Saved cache snapshot");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to save cache snapshot");
                Err(e)
            }
        }
    }
}

/// Run the DNS proxy until interrupted (Ctrl-C).
pub async fn run(config: ProxyConfig) -> Result<()> {
    let proxy = Proxy::bind(config).await?;

    proxy
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn sweep_loop(cache: Arc<RecordCache>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let removed = cache.sweep();
        if removed > 0 {
            info!(removed, remaining = cache.len(), "Swept expired cache entries");
        }
    }
}

async fn stats_loop(resolver: Arc<Resolver>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let stats = resolver.stats_snapshot_and_reset();
        info!(
            uptime_secs = stats.uptime_secs,
            cache = resolver.cache_len(),
            requests = stats.requests,
            synthesized = stats.synthesized,
            forwarded = stats.forwarded,
            dropped = stats.dropped,
            learned = stats.learned,
            avg_response_ms = stats.avg_response_ms,
            "stats"
        );
    }
}
