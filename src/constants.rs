//! Fixed names, ports and policy constants shared across the operator.

/// Label applied to every object this operator creates or adopts.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "redis-operator";

pub const APP_LABEL: &str = "app";
pub const APP_LABEL_VALUE: &str = "redis-operator";
pub const COMPONENT_LABEL: &str = "component";

pub const BASE_NAME: &str = "base";
pub const REDIS_NAME: &str = "redis";
pub const SENTINEL_NAME: &str = "sentinel";
pub const REDIS_SHUTDOWN_NAME: &str = "redis-shutdown";

pub const REDIS_ROLE: &str = "redis";
pub const SENTINEL_ROLE: &str = "sentinel";

pub const REDIS_STORAGE_VOLUME_NAME: &str = "redis-data";
pub const REDIS_CONFIG_VOLUME_NAME: &str = "redis-config";
pub const REDIS_SHUTDOWN_CONFIG_VOLUME_NAME: &str = "redis-shutdown-config";

pub const REDIS_CONFIG_FILE_NAME: &str = "redis.conf";
pub const SENTINEL_CONFIG_FILE_NAME: &str = "sentinel.conf";

pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

pub const REDIS_PORT: u16 = 6379;
pub const SENTINEL_PORT: u16 = 26379;

pub const EXPORTER_PORT: u16 = 9121;
pub const EXPORTER_PORT_NAME: &str = "http-metrics";
pub const EXPORTER_CONTAINER_NAME: &str = "redis-exporter";

/// Grace period (seconds) given to a pod's preStop shutdown hook.
pub const GRACE_TIME_SECONDS: i64 = 30;

/// Field manager used for all server-side apply calls issued by the syncer.
pub const FIELD_MANAGER: &str = "redis-operator";

/// Finalizer installed on every `RedisCluster`.
pub const FINALIZER: &str = "redisclusters.redis.example.com/cleanup";

/// Per-call deadline for outbound Redis/Sentinel commands (§5).
pub const REDIS_CALL_DEADLINE: std::time::Duration = std::time::Duration::from_secs(5);

/// Logical Sentinel master name monitored for a given cluster.
pub fn monitor_name(cluster_name: &str) -> String {
    format!("mymaster-{cluster_name}")
}
