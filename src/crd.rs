//! The `RedisCluster` custom resource: desired state for a primary/replica
//! Redis deployment supervised by Sentinel.
//!
//! Grounded on `apis/redis/v1alpha1/redis_types.go` and
//! `apis/redis/v1alpha1/defaults.go` in the upstream Go operator, re-expressed
//! as a `kube::CustomResource`.

use k8s_openapi::api::core::v1::{Affinity, PodSecurityContext, ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DEFAULT_REDIS_REPLICAS: i32 = 3;
const DEFAULT_SENTINEL_REPLICAS: i32 = 3;
const DEFAULT_REDIS_IMAGE: &str = "redis:7.2-alpine";
const DEFAULT_SENTINEL_IMAGE: &str = "redis:7.2-alpine";
const DEFAULT_EXPORTER_IMAGE: &str = "oliver006/redis_exporter:v1.55.0";

/// Desired state of a highly-available Redis cluster.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "redis.example.com",
    version = "v1alpha1",
    kind = "RedisCluster",
    plural = "redisclusters",
    shortname = "rfc",
    namespaced,
    status = "RedisClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterSpec {
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub sentinel: SentinelSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisSettings {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub custom_config: Vec<String>,
    #[serde(default)]
    pub shutdown_config_map: Option<String>,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub exporter: ExporterSettings,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub affinity: Option<Affinity>,
    #[serde(default)]
    pub anti_affinity: AntiAffinityStrength,
    #[serde(default)]
    pub security_context: Option<PodSecurityContext>,
    #[serde(default)]
    pub tolerations: Option<Vec<Toleration>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentinelSettings {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub custom_config: Vec<String>,
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub affinity: Option<Affinity>,
    #[serde(default)]
    pub anti_affinity: AntiAffinityStrength,
    #[serde(default)]
    pub security_context: Option<PodSecurityContext>,
    #[serde(default)]
    pub tolerations: Option<Vec<Toleration>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AntiAffinityStrength {
    #[default]
    Soft,
    Hard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExporterSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum StorageSettings {
    Ephemeral,
    PersistentClaim {
        #[serde(default)]
        keep_after_deletion: bool,
        #[serde(default)]
        storage_class_name: Option<String>,
        #[serde(default = "default_storage_request")]
        request: String,
    },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Ephemeral
    }
}

fn default_storage_request() -> String {
    "1Gi".to_string()
}

/// Status subresource, a read-only projection updated once per reconcile
/// pass. It never feeds back into reconciliation decisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisClusterStatus {
    #[serde(default)]
    pub observed_primary: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: String,
}

impl RedisCluster {
    /// Applies built-in defaults in-place, mirroring `Redis.SetDefaults` in
    /// the upstream Go operator.
    pub fn apply_defaults(&mut self) {
        let redis = &mut self.spec.redis;
        if redis.replicas.is_none() {
            redis.replicas = Some(DEFAULT_REDIS_REPLICAS);
        }
        if redis.image.is_none() {
            redis.image = Some(DEFAULT_REDIS_IMAGE.to_string());
        }
        if redis.exporter.image.is_none() {
            redis.exporter.image = Some(DEFAULT_EXPORTER_IMAGE.to_string());
        }

        let sentinel = &mut self.spec.sentinel;
        if sentinel.replicas.is_none() {
            sentinel.replicas = Some(DEFAULT_SENTINEL_REPLICAS);
        }
        if sentinel.image.is_none() {
            sentinel.image = Some(DEFAULT_SENTINEL_IMAGE.to_string());
        }
        if sentinel.custom_config.is_empty() {
            sentinel.custom_config = vec![
                "down-after-milliseconds 5000".to_string(),
                "failover-timeout 10000".to_string(),
            ];
        }
    }

    pub fn redis_replicas(&self) -> i32 {
        self.spec.redis.replicas.unwrap_or(DEFAULT_REDIS_REPLICAS)
    }

    pub fn sentinel_replicas(&self) -> i32 {
        self.spec.sentinel.replicas.unwrap_or(DEFAULT_SENTINEL_REPLICAS)
    }

    pub fn redis_custom_config(&self) -> &[String] {
        &self.spec.redis.custom_config
    }

    pub fn sentinel_custom_config(&self) -> &[String] {
        &self.spec.sentinel.custom_config
    }

    pub fn monitor_name(&self) -> String {
        crate::constants::monitor_name(&self.name_unchecked())
    }

    pub fn name_unchecked(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    pub fn namespace_unchecked(&self) -> String {
        self.metadata.namespace.clone().unwrap_or_default()
    }
}

/// `⌊sentinelReplicas/2⌋ + 1`, the majority needed for Sentinel to trigger a
/// failover.
pub fn quorum(sentinel_replicas: i32) -> i32 {
    sentinel_replicas / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_matches_majority_formula() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
        assert_eq!(quorum(7), 4);
    }

    #[test]
    fn defaults_fill_only_unset_fields() {
        let mut cluster = RedisCluster::new("demo", RedisClusterSpec::default());
        cluster.spec.redis.replicas = Some(5);
        cluster.apply_defaults();
        assert_eq!(cluster.redis_replicas(), 5);
        assert_eq!(cluster.sentinel_replicas(), 3);
        assert_eq!(cluster.spec.sentinel.custom_config.len(), 2);
    }
}
