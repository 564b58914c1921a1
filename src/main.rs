use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hoard::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "hoard")]
#[command(about = "Caching DNS forwarding proxy", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value = "1025")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Upstream DNS server (ip or ip:port, port defaults to 53)
    #[arg(short, long, default_value = "8.8.8.8:53", value_parser = parse_upstream)]
    upstream: SocketAddr,

    /// Cache snapshot file, read at startup and written on Ctrl-C
    #[arg(short, long, default_value = "cache.json")]
    snapshot: PathBuf,

    /// Seconds between expiry sweeps
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval: u64,

    /// Milliseconds to wait for an upstream reply
    #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
    upstream_timeout_ms: u64,

    /// Seconds between stats reports (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    /// Log every query (domain, outcome, timing)
    #[arg(short, long)]
    verbose: bool,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        let mut config = ProxyConfig::new(SocketAddr::new(self.bind, self.port), self.upstream);
        config.upstream_timeout = Duration::from_millis(self.upstream_timeout_ms);
        config.snapshot_path = self.snapshot;
        config.sweep_interval = Duration::from_secs(self.sweep_interval);
        config.stats_interval = (self.stats_interval > 0).then(|| Duration::from_secs(self.stats_interval));
        config.verbose = self.verbose;
        config
    }
}

fn parse_upstream(s: &str) -> Result<SocketAddr, String> {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip = s.trim_start_matches('[').trim_end_matches(']');
    ip.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| format!("invalid upstream address '{s}'"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    let config = args.into_config();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(proxy::run(config))
        .context("DNS proxy failed")
}
