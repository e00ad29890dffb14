//! A thin, direct client for the fixed vocabulary of Redis/Sentinel commands
//! the operator needs (§4.2). No connection pooling, no retries — failures
//! surface as [`Error`] and the caller (Checker/Healer) decides what to do.

mod resp;
mod tcp;

#[cfg(test)]
pub mod fake;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use snafu::Snafu;

pub use tcp::TcpRedisProtocolClient;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("connecting to {endpoint}: {source}"))]
    Connect { endpoint: SocketAddr, source: std::io::Error },

    #[snafu(display("sending command to {endpoint}: {source}"))]
    Send { endpoint: SocketAddr, source: std::io::Error },

    #[snafu(display("reading reply from {endpoint}: {source}"))]
    Read { endpoint: SocketAddr, source: std::io::Error },

    #[snafu(display("{endpoint} returned an error reply: {message}"))]
    ErrorReply { endpoint: SocketAddr, message: String },

    #[snafu(display("unexpected reply from {endpoint}: {reason}"))]
    UnexpectedReply { endpoint: SocketAddr, reason: String },

    #[snafu(display("command to {endpoint} timed out after {timeout:?}"))]
    Timeout { endpoint: SocketAddr, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single runtime config directive, e.g. `down-after-milliseconds 5000`.
/// Split lazily at the point of use since the CRD stores these as whole
/// strings (matching the upstream `CustomConfig []string` field).
pub fn split_directive(directive: &str) -> (&str, &str) {
    directive.split_once(' ').unwrap_or((directive, ""))
}

/// The command vocabulary of §4.2, targeting one endpoint per call.
#[async_trait]
pub trait RedisProtocolClient: Send + Sync {
    async fn is_primary(&self, ep: SocketAddr) -> Result<bool>;
    async fn get_replica_of(&self, ep: SocketAddr) -> Result<String>;
    async fn make_primary(&self, ep: SocketAddr) -> Result<()>;
    async fn make_replica_of(&self, ep: SocketAddr, primary: SocketAddr) -> Result<()>;
    async fn monitor(&self, sentinel: SocketAddr, primary: SocketAddr, name: &str, quorum: i32) -> Result<()>;
    async fn reset_sentinel(&self, sentinel: SocketAddr, name: &str) -> Result<()>;
    async fn sentinel_peer_count(&self, sentinel: SocketAddr, name: &str) -> Result<i32>;
    async fn sentinel_replica_count(&self, sentinel: SocketAddr, name: &str) -> Result<i32>;
    async fn sentinel_monitor_address(&self, sentinel: SocketAddr, name: &str) -> Result<Option<SocketAddr>>;
    async fn set_redis_runtime_config(&self, ep: SocketAddr, directives: &[String]) -> Result<()>;
    async fn set_sentinel_runtime_config(&self, ep: SocketAddr, name: &str, directives: &[String]) -> Result<()>;
}

/// Wraps any [`RedisProtocolClient`] call with the suggested 5s per-call
/// deadline (§5), converting a timeout into [`Error::Timeout`].
pub async fn with_deadline<T>(
    endpoint: SocketAddr,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout { endpoint, timeout })?
}
