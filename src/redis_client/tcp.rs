//! Production [`RedisProtocolClient`] backed by a fresh TCP connection per
//! call, issuing the standard Redis text protocol (`INFO replication`,
//! `REPLICAOF`, `CONFIG SET`, `SENTINEL ...`) per §6.

use std::net::SocketAddr;

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::resp::{encode_command, read_reply, Reply};
use super::{
    ConnectSnafu, ErrorReplySnafu, ReadSnafu, RedisProtocolClient, Result, SendSnafu, UnexpectedReplySnafu,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpRedisProtocolClient;

impl TcpRedisProtocolClient {
    pub fn new() -> Self {
        Self
    }

    async fn call(&self, ep: SocketAddr, args: &[&str]) -> Result<Reply> {
        super::with_deadline(ep, crate::constants::REDIS_CALL_DEADLINE, self.call_uncapped(ep, args)).await
    }

    async fn call_uncapped(&self, ep: SocketAddr, args: &[&str]) -> Result<Reply> {
        let mut stream = TcpStream::connect(ep).await.context(ConnectSnafu { endpoint: ep })?;
        stream
            .write_all(&encode_command(args))
            .await
            .context(SendSnafu { endpoint: ep })?;
        let mut reader = BufReader::new(stream);
        let reply = read_reply(&mut reader).await.context(ReadSnafu { endpoint: ep })?;
        if let Reply::Error(message) = &reply {
            return ErrorReplySnafu { endpoint: ep, message: message.clone() }.fail();
        }
        Ok(reply)
    }

    async fn call_ok(&self, ep: SocketAddr, args: &[&str]) -> Result<()> {
        self.call(ep, args).await.map(|_| ())
    }
}

#[async_trait]
impl RedisProtocolClient for TcpRedisProtocolClient {
    async fn is_primary(&self, ep: SocketAddr) -> Result<bool> {
        Ok(self.get_replica_of(ep).await?.is_empty())
    }

    async fn get_replica_of(&self, ep: SocketAddr) -> Result<String> {
        let reply = self.call(ep, &["INFO", "replication"]).await?;
        let body = reply.into_bulk_string().unwrap_or_default();
        let role = field(&body, "role").unwrap_or_default();
        if role == "master" {
            return Ok(String::new());
        }
        let host = field(&body, "master_host").unwrap_or_default();
        let port = field(&body, "master_port").unwrap_or_default();
        if host.is_empty() || port.is_empty() {
            return UnexpectedReplySnafu { endpoint: ep, reason: "replica with no master_host/master_port" }.fail();
        }
        Ok(format!("{host}:{port}"))
    }

    async fn make_primary(&self, ep: SocketAddr) -> Result<()> {
        self.call_ok(ep, &["REPLICAOF", "NO", "ONE"]).await
    }

    async fn make_replica_of(&self, ep: SocketAddr, primary: SocketAddr) -> Result<()> {
        let ip = primary.ip().to_string();
        let port = primary.port().to_string();
        self.call_ok(ep, &["REPLICAOF", &ip, &port]).await
    }

    async fn monitor(&self, sentinel: SocketAddr, primary: SocketAddr, name: &str, quorum: i32) -> Result<()> {
        let _ = self.call(sentinel, &["SENTINEL", "REMOVE", name]).await;
        let ip = primary.ip().to_string();
        let port = primary.port().to_string();
        let quorum = quorum.to_string();
        self.call_ok(sentinel, &["SENTINEL", "MONITOR", name, &ip, &port, &quorum]).await
    }

    async fn reset_sentinel(&self, sentinel: SocketAddr, name: &str) -> Result<()> {
        self.call_ok(sentinel, &["SENTINEL", "RESET", name]).await
    }

    async fn sentinel_peer_count(&self, sentinel: SocketAddr, name: &str) -> Result<i32> {
        let reply = self.call(sentinel, &["SENTINEL", "SENTINELS", name]).await?;
        let known = reply.into_array().map(|items| items.len()).unwrap_or(0);
        // `SENTINEL SENTINELS` excludes the queried Sentinel itself.
        Ok(known as i32 + 1)
    }

    async fn sentinel_replica_count(&self, sentinel: SocketAddr, name: &str) -> Result<i32> {
        let reply = self.call(sentinel, &["SENTINEL", "SLAVES", name]).await?;
        Ok(reply.into_array().map(|items| items.len()).unwrap_or(0) as i32)
    }

    async fn sentinel_monitor_address(&self, sentinel: SocketAddr, name: &str) -> Result<Option<SocketAddr>> {
        let reply = self.call(sentinel, &["SENTINEL", "GET-MASTER-ADDR-BY-NAME", name]).await?;
        let Some(items) = reply.into_array() else {
            return Ok(None);
        };
        let [ip, port] = items.as_slice() else {
            return Ok(None);
        };
        let ip = ip.clone().into_bulk_string().unwrap_or_default();
        let port = port.clone().into_bulk_string().unwrap_or_default();
        Ok(format!("{ip}:{port}").parse().ok())
    }

    async fn set_redis_runtime_config(&self, ep: SocketAddr, directives: &[String]) -> Result<()> {
        for directive in directives {
            let (key, value) = super::split_directive(directive);
            self.call_ok(ep, &["CONFIG", "SET", key, value]).await?;
        }
        Ok(())
    }

    async fn set_sentinel_runtime_config(&self, ep: SocketAddr, name: &str, directives: &[String]) -> Result<()> {
        // Sentinel exposes per-master config tuning via `SENTINEL SET`.
        for directive in directives {
            let (key, value) = super::split_directive(directive);
            self.call_ok(ep, &["SENTINEL", "SET", name, key, value]).await?;
        }
        Ok(())
    }
}

/// Extracts `key:value` from an `INFO`-style newline-delimited body.
fn field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines()
        .find_map(|line| line.strip_prefix(&format!("{key}:")))
        .map(|v| v.trim_end_matches('\r'))
}
