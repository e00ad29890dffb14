//! Probes live topology and reports divergences from the invariants of §3.
//! Performs no mutation — safe to call concurrently with itself (§4.3).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;

use crate::crd::RedisCluster;
use crate::platform::{PlatformClient, PodPhase, WorkloadKind};
use crate::redis_client::RedisProtocolClient;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Platform { source: crate::platform::Error },

    #[snafu(display("{source}"))]
    RedisCommand { source: crate::redis_client::Error },

    #[snafu(display("number of redis nodes known as primary is {count}, expected exactly 1"))]
    PrimaryCountMismatch { count: i32 },

    #[snafu(display("endpoint {endpoint} does not follow primary {primary}, replicates {actual}"))]
    DivergentReplica { endpoint: SocketAddr, primary: SocketAddr, actual: String },

    #[snafu(display("sentinel {sentinel} monitors {actual:?}, expected {expected}"))]
    SentinelMonitorMismatch { sentinel: SocketAddr, expected: SocketAddr, actual: Option<SocketAddr> },

    #[snafu(display("sentinel {sentinel} knows {actual} peers, expected {expected}"))]
    SentinelPeerMismatch { sentinel: SocketAddr, expected: i32, actual: i32 },

    #[snafu(display("sentinel {sentinel} knows {actual} replicas, expected {expected}"))]
    SentinelReplicaMismatch { sentinel: SocketAddr, expected: i32, actual: i32 },
}

impl From<crate::platform::Error> for Error {
    fn from(source: crate::platform::Error) -> Self {
        Error::Platform { source }
    }
}

impl From<crate::redis_client::Error> for Error {
    fn from(source: crate::redis_client::Error) -> Self {
        Error::RedisCommand { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Checker<P, R> {
    platform: Arc<P>,
    redis: Arc<R>,
}

impl<P: PlatformClient, R: RedisProtocolClient> Checker<P, R> {
    pub fn new(platform: Arc<P>, redis: Arc<R>) -> Self {
        Self { platform, redis }
    }

    /// Running Redis pod endpoints at the default Redis port.
    pub async fn redis_endpoints(&self, cluster: &RedisCluster) -> Result<Vec<SocketAddr>> {
        let pods = self
            .platform
            .list_pods_of(WorkloadKind::StatefulSet, &cluster.namespace_unchecked(), &crate::labels::redis_name(cluster))
            .await?;
        Ok(running_endpoints(&pods, crate::constants::REDIS_PORT))
    }

    /// Running Sentinel pod endpoints at the default Sentinel port.
    pub async fn sentinel_endpoints(&self, cluster: &RedisCluster) -> Result<Vec<SocketAddr>> {
        let pods = self
            .platform
            .list_pods_of(WorkloadKind::Deployment, &cluster.namespace_unchecked(), &crate::labels::sentinel_name(cluster))
            .await?;
        Ok(running_endpoints(&pods, crate::constants::SENTINEL_PORT))
    }

    pub async fn count_primaries(&self, cluster: &RedisCluster) -> Result<i32> {
        let mut count = 0;
        for ep in self.redis_endpoints(cluster).await? {
            if self.redis.is_primary(ep).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// The unique primary; fails if the observed count is not exactly 1.
    pub async fn find_primary(&self, cluster: &RedisCluster) -> Result<SocketAddr> {
        let mut found = None;
        let mut count = 0;
        for ep in self.redis_endpoints(cluster).await? {
            if self.redis.is_primary(ep).await? {
                count += 1;
                found = Some(ep);
            }
        }
        match (count, found) {
            (1, Some(ep)) => Ok(ep),
            _ => PrimaryCountMismatchSnafu { count }.fail(),
        }
    }

    pub async fn check_all_replicas_follow(&self, primary: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        for ep in self.redis_endpoints(cluster).await? {
            let replica_of = self.redis.get_replica_of(ep).await?;
            if !replica_of.is_empty() && replica_of != primary.to_string() {
                return DivergentReplicaSnafu { endpoint: ep, primary, actual: replica_of }.fail();
            }
        }
        Ok(())
    }

    pub async fn check_sentinel_monitor(&self, sentinel: SocketAddr, expected_primary: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        let actual = self.redis.sentinel_monitor_address(sentinel, &cluster.monitor_name()).await?;
        if actual != Some(expected_primary) {
            return SentinelMonitorMismatchSnafu { sentinel, expected: expected_primary, actual }.fail();
        }
        Ok(())
    }

    pub async fn check_sentinel_peers(&self, sentinel: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        let expected = cluster.sentinel_replicas();
        let actual = self.redis.sentinel_peer_count(sentinel, &cluster.monitor_name()).await?;
        if actual != expected {
            return SentinelPeerMismatchSnafu { sentinel, expected, actual }.fail();
        }
        Ok(())
    }

    pub async fn check_sentinel_replicas(&self, sentinel: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        let expected = cluster.redis_replicas() - 1;
        let actual = self.redis.sentinel_replica_count(sentinel, &cluster.monitor_name()).await?;
        if actual != expected {
            return SentinelReplicaMismatchSnafu { sentinel, expected, actual }.fail();
        }
        Ok(())
    }

    /// Minimum wall-clock age across running Redis pods; a large sentinel
    /// value if none are running, so the election-wait gate in the
    /// orchestrator never fires prematurely on an empty set.
    pub async fn min_redis_pod_age(&self, cluster: &RedisCluster) -> Result<Duration> {
        let pods = self
            .platform
            .list_pods_of(WorkloadKind::StatefulSet, &cluster.namespace_unchecked(), &crate::labels::redis_name(cluster))
            .await?;
        let now = chrono::Utc::now();
        let min = pods
            .iter()
            .filter(|p| p.is_running())
            .filter_map(|p| p.start_time)
            .map(|start| (now - start).to_std().unwrap_or(Duration::ZERO))
            .min();
        Ok(min.unwrap_or(Duration::from_secs(100_000 * 3600)))
    }
}

fn running_endpoints(pods: &[crate::platform::PodObservation], port: u16) -> Vec<SocketAddr> {
    pods.iter()
        .filter(|p| p.phase == PodPhase::Running)
        .filter_map(|p| p.ip.as_ref())
        .filter_map(|ip| format!("{ip}:{port}").parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RedisClusterSpec;
    use crate::platform::fake::FakePlatformClient;
    use crate::platform::PodObservation;
    use crate::redis_client::fake::FakeRedisProtocolClient;
    use chrono::Utc;

    fn cluster() -> RedisCluster {
        let mut c = RedisCluster::new("demo", RedisClusterSpec::default());
        c.metadata.namespace = Some("default".to_string());
        c.apply_defaults();
        c
    }

    fn pod(name: &str, ip: &str, age_secs: i64) -> PodObservation {
        let start = Utc::now() - chrono::Duration::seconds(age_secs);
        PodObservation {
            name: name.to_string(),
            ip: Some(ip.to_string()),
            phase: PodPhase::Running,
            creation_timestamp: start,
            start_time: Some(start),
        }
    }

    #[tokio::test]
    async fn count_primaries_sums_is_primary_across_endpoints() {
        let cluster = cluster();
        let platform = Arc::new(FakePlatformClient::new());
        platform.set_pods(
            WorkloadKind::StatefulSet,
            "default",
            &crate::labels::redis_name(&cluster),
            vec![pod("r0", "10.0.0.1", 10), pod("r1", "10.0.0.2", 10)],
        );
        let redis = Arc::new(FakeRedisProtocolClient::new());
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_replica_of("10.0.0.2:6379".parse().unwrap(), "10.0.0.1:6379".parse().unwrap());

        let checker = Checker::new(platform, redis);
        assert_eq!(checker.count_primaries(&cluster).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_primary_fails_when_not_exactly_one() {
        let cluster = cluster();
        let platform = Arc::new(FakePlatformClient::new());
        platform.set_pods(
            WorkloadKind::StatefulSet,
            "default",
            &crate::labels::redis_name(&cluster),
            vec![pod("r0", "10.0.0.1", 10), pod("r1", "10.0.0.2", 10)],
        );
        let redis = Arc::new(FakeRedisProtocolClient::new());
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_primary("10.0.0.2:6379".parse().unwrap());

        let checker = Checker::new(platform, redis);
        assert!(matches!(checker.find_primary(&cluster).await, Err(Error::PrimaryCountMismatch { count: 2 })));
    }
}
