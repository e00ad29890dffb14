//! Dumps the generated `CustomResourceDefinition` for `RedisCluster` to
//! stdout as YAML, the way every `kube::CustomResource`-based operator in the
//! retrieval pack exposes a `crdgen` helper binary for `kubectl apply -f -`.

use kube::CustomResourceExt;
use redis_operator::crd::RedisCluster;

fn main() {
    print!("{}", serde_yaml::to_string(&RedisCluster::crd()).expect("RedisCluster::crd() always serializes"));
}
