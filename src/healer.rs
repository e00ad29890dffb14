//! Mutating actions the orchestrator applies once the Checker has located a
//! divergence (§4.4). Each method issues exactly the Redis/Sentinel commands
//! needed to correct one specific divergence — no compound actions.

use std::net::SocketAddr;
use std::sync::Arc;

use snafu::{OptionExt, Snafu};

use crate::crd::RedisCluster;
use crate::platform::{PlatformClient, PodObservation, WorkloadKind};
use crate::redis_client::RedisProtocolClient;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Platform { source: crate::platform::Error },

    #[snafu(display("{source}"))]
    RedisCommand { source: crate::redis_client::Error },

    #[snafu(display("no running redis pods to promote for cluster {cluster}"))]
    NoCandidateToPromote { cluster: String },
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

pub struct Healer<P, R> {
    platform: Arc<P>,
    redis: Arc<R>,
}

impl<P: PlatformClient, R: RedisProtocolClient> Healer<P, R> {
    pub fn new(platform: Arc<P>, redis: Arc<R>) -> Self {
        Self { platform, redis }
    }

    /// The single running pod becomes primary unconditionally (§4.4, §8 cold
    /// start scenario: one pod, nothing to compare against).
    pub async fn promote_singleton(&self, ep: SocketAddr) -> Result<()> {
        self.redis.make_primary(ep).await?;
        Ok(())
    }

    /// Among running Redis pods, the oldest by `(creation_timestamp, name)`
    /// is promoted primary and every remaining running pod is pointed at it.
    /// Resolves the "split primary" and "no primary" scenarios of §8.
    pub async fn promote_oldest_as_primary(&self, cluster: &RedisCluster) -> Result<SocketAddr> {
        let pods = self
            .platform
            .list_pods_of(WorkloadKind::StatefulSet, &cluster.namespace_unchecked(), &crate::labels::redis_name(cluster))
            .await?;
        let mut running: Vec<&PodObservation> = pods.iter().filter(|p| p.is_running()).collect();
        running.sort_by_key(|p| (p.creation_timestamp, p.name.clone()));
        let mut iter = running.into_iter();
        let oldest = iter.next().context(NoCandidateToPromoteSnafu { cluster: cluster.name_unchecked() })?;
        let primary: SocketAddr = format!("{}:{}", oldest.ip.as_deref().unwrap_or_default(), crate::constants::REDIS_PORT)
            .parse()
            .map_err(|_| Error::NoCandidateToPromote { cluster: cluster.name_unchecked() })?;
        self.redis.make_primary(primary).await?;
        for pod in iter {
            let ep: SocketAddr = format!("{}:{}", pod.ip.as_deref().unwrap_or_default(), crate::constants::REDIS_PORT)
                .parse()
                .map_err(|_| Error::NoCandidateToPromote { cluster: cluster.name_unchecked() })?;
            self.redis.make_replica_of(ep, primary).await?;
        }
        Ok(primary)
    }

    /// Points every running Redis pod at `primary`: the primary itself gets
    /// an idempotent `makePrimary`, every other endpoint `makeReplicaOf`.
    pub async fn enforce_primary_everywhere(&self, primary: SocketAddr, endpoints: &[SocketAddr]) -> Result<()> {
        for &ep in endpoints {
            if ep == primary {
                self.redis.make_primary(ep).await?;
            } else {
                self.redis.make_replica_of(ep, primary).await?;
            }
        }
        Ok(())
    }

    pub async fn point_sentinel(&self, sentinel: SocketAddr, primary: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        let quorum = crate::crd::quorum(cluster.sentinel_replicas());
        self.redis.monitor(sentinel, primary, &cluster.monitor_name(), quorum).await?;
        Ok(())
    }

    pub async fn reset_sentinel_memory(&self, sentinel: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        self.redis.reset_sentinel(sentinel, &cluster.monitor_name()).await?;
        Ok(())
    }

    pub async fn apply_redis_runtime_config(&self, ep: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        if !cluster.redis_custom_config().is_empty() {
            self.redis.set_redis_runtime_config(ep, cluster.redis_custom_config()).await?;
        }
        Ok(())
    }

    pub async fn apply_sentinel_runtime_config(&self, ep: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        if !cluster.sentinel_custom_config().is_empty() {
            self.redis
                .set_sentinel_runtime_config(ep, &cluster.monitor_name(), cluster.sentinel_custom_config())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::RedisClusterSpec;
    use crate::platform::fake::FakePlatformClient;
    use crate::platform::PodPhase;
    use crate::redis_client::fake::{FakeRedisProtocolClient, RecordedCommand};
    use chrono::Utc;

    fn cluster() -> RedisCluster {
        let mut c = RedisCluster::new("demo", RedisClusterSpec::default());
        c.metadata.namespace = Some("default".to_string());
        c.apply_defaults();
        c
    }

    fn pod(name: &str, ip: &str, age_secs: i64) -> PodObservation {
        let ts = Utc::now() - chrono::Duration::seconds(age_secs);
        PodObservation { name: name.to_string(), ip: Some(ip.to_string()), phase: PodPhase::Running, creation_timestamp: ts, start_time: Some(ts) }
    }

    #[tokio::test]
    async fn promotes_oldest_running_pod_and_replicas_the_rest() {
        let cluster = cluster();
        let platform = Arc::new(FakePlatformClient::new());
        platform.set_pods(
            WorkloadKind::StatefulSet,
            "default",
            &crate::labels::redis_name(&cluster),
            vec![pod("r1", "10.0.0.2", 5), pod("r0", "10.0.0.1", 50)],
        );
        let redis = Arc::new(FakeRedisProtocolClient::new());
        let healer = Healer::new(platform, redis.clone());

        let primary = healer.promote_oldest_as_primary(&cluster).await.unwrap();
        assert_eq!(primary, "10.0.0.1:6379".parse().unwrap());
        assert_eq!(
            redis.commands(),
            vec![
                RecordedCommand::MakePrimary("10.0.0.1:6379".parse().unwrap()),
                RecordedCommand::MakeReplicaOf("10.0.0.2:6379".parse().unwrap(), "10.0.0.1:6379".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn promote_oldest_fails_with_no_running_pods() {
        let cluster = cluster();
        let platform = Arc::new(FakePlatformClient::new());
        platform.set_pods(WorkloadKind::StatefulSet, "default", &crate::labels::redis_name(&cluster), vec![]);
        let redis = Arc::new(FakeRedisProtocolClient::new());
        let healer = Healer::new(platform, redis);

        assert!(matches!(
            healer.promote_oldest_as_primary(&cluster).await,
            Err(Error::NoCandidateToPromote { .. })
        ));
    }

    #[tokio::test]
    async fn enforce_primary_everywhere_reasserts_primary_and_replicas_the_rest() {
        let redis = Arc::new(FakeRedisProtocolClient::new());
        let platform = Arc::new(FakePlatformClient::new());
        let healer = Healer::new(platform, redis.clone());
        let primary: SocketAddr = "10.0.0.1:6379".parse().unwrap();
        let replica: SocketAddr = "10.0.0.2:6379".parse().unwrap();

        healer.enforce_primary_everywhere(primary, &[primary, replica]).await.unwrap();
        assert_eq!(
            redis.commands(),
            vec![RecordedCommand::MakePrimary(primary), RecordedCommand::MakeReplicaOf(replica, primary)]
        );
    }
}
