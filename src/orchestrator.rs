//! The core state machine: `check_and_heal` runs the Checker/Healer pair
//! through stages A-D on every reconcile pass (§4.5). No transactional log,
//! no locking — every heal action is state-convergent, so a retry after a
//! partial failure simply re-observes and re-converges (§9).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;
use tracing::{info, warn};

use crate::checker::Checker;
use crate::crd::RedisCluster;
use crate::healer::Healer;
use crate::platform::PlatformClient;
use crate::redis_client::RedisProtocolClient;

/// Sentinel is given this long to complete its own native election before
/// the orchestrator forces a promotion (§4.5 Stage A).
pub const ELECTION_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Checker { source: crate::checker::Error },

    #[snafu(display("{source}"))]
    Healer { source: crate::healer::Error },

    #[snafu(display("more than one primary; manual intervention required ({count} observed)"))]
    MorePrimaries { count: i32 },
}

impl From<crate::checker::Error> for Error {
    fn from(source: crate::checker::Error) -> Self {
        Error::Checker { source }
    }
}

impl From<crate::healer::Error> for Error {
    fn from(source: crate::healer::Error) -> Self {
        Error::Healer { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct FailoverOrchestrator<P, R> {
    checker: Checker<P, R>,
    healer: Healer<P, R>,
}

impl<P: PlatformClient, R: RedisProtocolClient> FailoverOrchestrator<P, R> {
    pub fn new(platform: Arc<P>, redis: Arc<R>) -> Self {
        Self {
            checker: Checker::new(platform.clone(), redis.clone()),
            healer: Healer::new(platform, redis),
        }
    }

    pub async fn check_and_heal(&self, cluster: &RedisCluster) -> Result<()> {
        let primary = match self.resolve_primary(cluster).await? {
            Some(primary) => primary,
            None => return Ok(()), // election window still open
        };

        self.converge_replicas(primary, cluster).await?;
        self.push_redis_runtime_config(cluster).await?;
        self.converge_sentinels(primary, cluster).await?;
        Ok(())
    }

    /// Stage A. Returns `None` when the election window is still open and
    /// the pass should end without further action.
    async fn resolve_primary(&self, cluster: &RedisCluster) -> Result<Option<SocketAddr>> {
        let name = cluster.name_unchecked();
        let n = self.checker.count_primaries(cluster).await?;
        match n {
            0 => {
                let endpoints = self.checker.redis_endpoints(cluster).await?;
                if endpoints.len() == 1 {
                    info!(cluster = %name, endpoint = %endpoints[0], "no primary observed, promoting the only running pod");
                    self.healer.promote_singleton(endpoints[0]).await?;
                    return Ok(Some(endpoints[0]));
                }
                let age = self.checker.min_redis_pod_age(cluster).await?;
                if age > ELECTION_WAIT {
                    info!(cluster = %name, ?age, "election window elapsed with no primary, forcing promotion of the oldest pod");
                    let primary = self.healer.promote_oldest_as_primary(cluster).await?;
                    Ok(Some(primary))
                } else {
                    info!(cluster = %name, ?age, "no primary observed but election window still open, deferring to sentinel");
                    Ok(None)
                }
            }
            1 => Ok(Some(self.checker.find_primary(cluster).await?)),
            count => {
                warn!(cluster = %name, count, "more than one redis endpoint reports primary; refusing to auto-resolve");
                MorePrimariesSnafu { count }.fail()
            }
        }
    }

    /// Stage B.
    async fn converge_replicas(&self, primary: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        if self.checker.check_all_replicas_follow(primary, cluster).await.is_err() {
            info!(cluster = %cluster.name_unchecked(), %primary, "replica divergence detected, repointing all endpoints at the primary");
            let endpoints = self.checker.redis_endpoints(cluster).await?;
            self.healer.enforce_primary_everywhere(primary, &endpoints).await?;
        }
        Ok(())
    }

    /// Stage C.
    async fn push_redis_runtime_config(&self, cluster: &RedisCluster) -> Result<()> {
        for ep in self.checker.redis_endpoints(cluster).await? {
            self.healer.apply_redis_runtime_config(ep, cluster).await?;
        }
        Ok(())
    }

    /// Stage D. Four separate passes over the Sentinel endpoint set, not
    /// interleaved per-endpoint: resets are disruptive, so the monitor step
    /// stabilizes across all Sentinels before any reset amplifies it.
    async fn converge_sentinels(&self, primary: SocketAddr, cluster: &RedisCluster) -> Result<()> {
        let sentinels = self.checker.sentinel_endpoints(cluster).await?;

        for &s in &sentinels {
            if self.checker.check_sentinel_monitor(s, primary, cluster).await.is_err() {
                info!(sentinel = %s, %primary, "sentinel monitor address drifted, repointing");
                self.healer.point_sentinel(s, primary, cluster).await?;
            }
        }
        for &s in &sentinels {
            if self.checker.check_sentinel_peers(s, cluster).await.is_err() {
                info!(sentinel = %s, "sentinel peer count diverged from sentinelReplicas, resetting in-memory state");
                self.healer.reset_sentinel_memory(s, cluster).await?;
            }
        }
        for &s in &sentinels {
            if self.checker.check_sentinel_replicas(s, cluster).await.is_err() {
                info!(sentinel = %s, "sentinel replica count diverged from redisReplicas-1, resetting in-memory state");
                self.healer.reset_sentinel_memory(s, cluster).await?;
            }
        }
        for &s in &sentinels {
            self.healer.apply_sentinel_runtime_config(s, cluster).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{quorum, RedisClusterSpec};
    use crate::platform::fake::FakePlatformClient;
    use crate::platform::{PodObservation, PodPhase, WorkloadKind};
    use crate::redis_client::fake::{FakeRedisProtocolClient, RecordedCommand};
    use chrono::Utc;

    fn cluster_with_replicas(redis_replicas: i32, sentinel_replicas: i32) -> RedisCluster {
        let mut c = RedisCluster::new("demo", RedisClusterSpec::default());
        c.metadata.namespace = Some("default".to_string());
        c.spec.redis.replicas = Some(redis_replicas);
        c.spec.sentinel.replicas = Some(sentinel_replicas);
        c.apply_defaults();
        c
    }

    fn pod(name: &str, ip: &str, age_secs: i64) -> PodObservation {
        let ts = Utc::now() - chrono::Duration::seconds(age_secs);
        PodObservation { name: name.to_string(), ip: Some(ip.to_string()), phase: PodPhase::Running, creation_timestamp: ts, start_time: Some(ts) }
    }

    fn orchestrator(
        cluster: &RedisCluster,
        redis_pods: Vec<PodObservation>,
        sentinel_pods: Vec<PodObservation>,
    ) -> (FailoverOrchestrator<FakePlatformClient, FakeRedisProtocolClient>, Arc<FakeRedisProtocolClient>) {
        let platform = Arc::new(FakePlatformClient::new());
        platform.set_pods(WorkloadKind::StatefulSet, "default", &crate::labels::redis_name(cluster), redis_pods);
        platform.set_pods(WorkloadKind::Deployment, "default", &crate::labels::sentinel_name(cluster), sentinel_pods);
        let redis = Arc::new(FakeRedisProtocolClient::new());
        (FailoverOrchestrator::new(platform, redis.clone()), redis)
    }

    #[tokio::test]
    async fn cold_start_single_pod_promotes_it() {
        let cluster = cluster_with_replicas(3, 0);
        let (orch, redis) = orchestrator(&cluster, vec![pod("r0", "10.0.0.1", 10)], vec![]);

        orch.check_and_heal(&cluster).await.unwrap();

        assert_eq!(redis.commands(), vec![RecordedCommand::MakePrimary("10.0.0.1:6379".parse().unwrap())]);
    }

    #[tokio::test]
    async fn cold_start_three_pods_election_window_open_issues_nothing() {
        let cluster = cluster_with_replicas(3, 0);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 30), pod("r1", "10.0.0.2", 40), pod("r2", "10.0.0.3", 50)],
            vec![],
        );

        orch.check_and_heal(&cluster).await.unwrap();

        assert!(redis.commands().is_empty());
    }

    #[tokio::test]
    async fn cold_start_three_pods_election_window_closed_promotes_oldest() {
        let cluster = cluster_with_replicas(3, 0);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 130), pod("r1", "10.0.0.2", 140), pod("r2", "10.0.0.3", 150)],
            vec![],
        );

        orch.check_and_heal(&cluster).await.unwrap();

        let commands = redis.commands();
        assert!(commands.contains(&RecordedCommand::MakePrimary("10.0.0.3:6379".parse().unwrap())));
        assert!(commands.contains(&RecordedCommand::MakeReplicaOf(
            "10.0.0.1:6379".parse().unwrap(),
            "10.0.0.3:6379".parse().unwrap()
        )));
        assert!(commands.contains(&RecordedCommand::MakeReplicaOf(
            "10.0.0.2:6379".parse().unwrap(),
            "10.0.0.3:6379".parse().unwrap()
        )));
    }

    #[tokio::test]
    async fn split_primary_is_fatal_and_issues_no_mutations() {
        let cluster = cluster_with_replicas(2, 0);
        let (orch, redis) = orchestrator(&cluster, vec![pod("r0", "10.0.0.1", 10), pod("r1", "10.0.0.2", 10)], vec![]);
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_primary("10.0.0.2:6379".parse().unwrap());

        let err = orch.check_and_heal(&cluster).await.unwrap_err();

        assert!(matches!(err, Error::MorePrimaries { count: 2 }));
        assert!(redis.commands().is_empty());
    }

    #[tokio::test]
    async fn sentinel_drift_repoints_monitor() {
        let cluster = cluster_with_replicas(1, 1);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 10)],
            vec![pod("s0", "10.1.0.1", 10)],
        );
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_sentinel(
            "10.1.0.1:26379".parse().unwrap(),
            "10.0.0.2:6379".parse().unwrap(),
            0,
            0,
        );

        orch.check_and_heal(&cluster).await.unwrap();

        assert!(redis.commands().contains(&RecordedCommand::Monitor {
            sentinel: "10.1.0.1:26379".parse().unwrap(),
            primary: "10.0.0.1:6379".parse().unwrap(),
            name: cluster.monitor_name(),
            quorum: quorum(1),
        }));
    }

    #[tokio::test]
    async fn sentinel_peer_miscount_resets_that_sentinel() {
        let cluster = cluster_with_replicas(1, 3);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 10)],
            vec![pod("s0", "10.1.0.1", 10)],
        );
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_sentinel(
            "10.1.0.1:26379".parse().unwrap(),
            "10.0.0.1:6379".parse().unwrap(),
            5,
            0,
        );

        orch.check_and_heal(&cluster).await.unwrap();

        assert!(redis
            .commands()
            .contains(&RecordedCommand::ResetSentinel("10.1.0.1:26379".parse().unwrap())));
    }

    #[tokio::test]
    async fn stable_state_issues_no_topology_mutating_commands() {
        let cluster = cluster_with_replicas(1, 1);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 10)],
            vec![pod("s0", "10.1.0.1", 10)],
        );
        redis.seed_primary("10.0.0.1:6379".parse().unwrap());
        redis.seed_sentinel(
            "10.1.0.1:26379".parse().unwrap(),
            "10.0.0.1:6379".parse().unwrap(),
            1,
            0,
        );

        orch.check_and_heal(&cluster).await.unwrap();

        let topology_mutations: Vec<_> = redis
            .commands()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    RecordedCommand::SetRedisConfig(..) | RecordedCommand::SetSentinelConfig(..)
                )
            })
            .collect();
        assert!(topology_mutations.is_empty());
    }

    #[tokio::test]
    async fn check_and_heal_is_idempotent_over_an_unchanged_fake() {
        let cluster = cluster_with_replicas(3, 0);
        let (orch, redis) = orchestrator(
            &cluster,
            vec![pod("r0", "10.0.0.1", 130), pod("r1", "10.0.0.2", 140), pod("r2", "10.0.0.3", 150)],
            vec![],
        );

        orch.check_and_heal(&cluster).await.unwrap();
        redis.clear_commands();
        orch.check_and_heal(&cluster).await.unwrap();

        let topology_mutations: Vec<_> = redis
            .commands()
            .into_iter()
            .filter(|c| {
                !matches!(
                    c,
                    RecordedCommand::SetRedisConfig(..) | RecordedCommand::SetSentinelConfig(..)
                )
            })
            .collect();
        assert!(topology_mutations.is_empty());
    }
}
