//! Transport layer for the DNS proxy.
//!
//! Receives DNS queries from clients over UDP and hands each one to the
//! resolver in its own task.

pub mod udp;

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::error::Error;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Logger for DNS query events.
///
/// Per-query outcome lines are only emitted in verbose mode; failures are
/// always logged.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    verbose: bool,
}

impl QueryLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn synthesized(&self, domain: &str, client: SocketAddr, elapsed_ms: f64) {
        if self.verbose {
            info!(
                domain = %domain,
                client = %client,
                total_ms = elapsed_ms,
                "SYNTHESIZED"
            );
        }
    }

    pub fn forwarded(&self, domain: &str, client: SocketAddr, total_ms: f64, upstream_ms: f64) {
        if self.verbose {
            info!(
                domain = %domain,
                client = %client,
                total_ms,
                upstream_ms,
                "FORWARDED"
            );
        }
    }

    pub fn ignored(&self, domain: &str, client: SocketAddr) {
        if self.verbose {
            info!(domain = %domain, client = %client, "DROPPED (no supported question)");
        } else {
            debug!(domain = %domain, client = %client, "Dropping query without supported question");
        }
    }

    pub fn dropped(&self, client: SocketAddr, error: &Error) {
        match error {
            Error::MalformedPacket(_) => {
                debug!(client = %client, error = %error, "Dropping malformed query")
            }
            _ => warn!(client = %client, error = %error, "Dropping query"),
        }
    }
}
