//! Error types for the proxy.
//!
//! None of these are fatal to the listening loop: a failed query is dropped
//! and logged, and an unreadable snapshot becomes an empty cache.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The buffer does not hold a well-formed DNS message.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// The upstream resolver did not answer (timeout or socket failure).
    #[error("upstream {upstream} unavailable: {source}")]
    UpstreamUnavailable {
        upstream: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("snapshot {path} unreadable: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot {path} is not valid JSON: {source}")]
    SnapshotFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot {path} has unsupported version {found}")]
    SnapshotVersion { path: PathBuf, found: u32 },

    /// A `ProxyConfig` value the proxy cannot run with.
    #[error("invalid proxy config: {0}")]
    InvalidConfig(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
