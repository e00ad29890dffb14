//! Library surface for the `redis-operator` binaries: the reconciliation
//! core (§2 of the design) plus the Kubernetes/Redis adapters it runs
//! against in production. Exposed as a library so both `redis-operator`
//! (the controller process) and `crdgen` (the schema-dump utility) share one
//! copy of the `RedisCluster` type and its defaulting logic.

pub mod checker;
pub mod constants;
pub mod crd;
pub mod healer;
pub mod labels;
pub mod metrics;
pub mod orchestrator;
pub mod platform;
pub mod reconciler;
pub mod redis_client;
pub mod syncer;
