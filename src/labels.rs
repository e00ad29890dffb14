//! Object naming and label conventions, grounded on the original operator's
//! `util/label.go` and `util/name.go`.

use std::collections::BTreeMap;

use crate::constants;
use crate::crd::RedisCluster;

/// Merges any number of label maps into a single new map, later maps winning
/// on key collision.
pub fn merge_labels(maps: impl IntoIterator<Item = BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for m in maps {
        out.extend(m);
    }
    out
}

/// Labels every managed object carries, regardless of role.
pub fn managed_by_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        constants::MANAGED_BY_LABEL.to_string(),
        constants::MANAGED_BY_VALUE.to_string(),
    )])
}

/// Role-specific selector labels, e.g. `{app: redis-operator, component: redis, redis: <cluster>}`.
pub fn role_labels(cluster: &RedisCluster, component: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (constants::APP_LABEL.to_string(), constants::APP_LABEL_VALUE.to_string()),
        (constants::COMPONENT_LABEL.to_string(), component.to_string()),
        (component.to_string(), role.to_string()),
        ("redis-operator.example.com/cluster".to_string(), cluster_name(cluster)),
    ])
}

fn cluster_name(cluster: &RedisCluster) -> String {
    cluster.metadata.name.clone().unwrap_or_default()
}

fn generate_name(type_name: &str, meta_name: &str) -> String {
    format!("{}-{}-{}", constants::BASE_NAME, type_name, meta_name)
}

pub fn redis_name(cluster: &RedisCluster) -> String {
    generate_name(constants::REDIS_NAME, &cluster_name(cluster))
}

pub fn redis_shutdown_name(cluster: &RedisCluster) -> String {
    generate_name(constants::REDIS_SHUTDOWN_NAME, &cluster_name(cluster))
}

pub fn redis_shutdown_configmap_name(cluster: &RedisCluster) -> String {
    match &cluster.spec.redis.shutdown_config_map {
        Some(name) if !name.is_empty() => name.clone(),
        _ => redis_shutdown_name(cluster),
    }
}

pub fn sentinel_name(cluster: &RedisCluster) -> String {
    generate_name(constants::SENTINEL_NAME, &cluster_name(cluster))
}
