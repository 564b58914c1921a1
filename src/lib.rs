//! Hoard - a caching DNS forwarding proxy.
//!
//! Answers A queries from records learned off earlier upstream replies and
//! forwards everything else. The library exposes the codec, cache and
//! server pieces for benchmarking and testing.

pub mod cache;
pub mod dns;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod upstream;

pub use error::{Error, Result};
