//! Read-only access to workloads and the pods they own (§4.1). The Checker
//! and Healer depend on this narrow trait, never on `kube::Client` directly,
//! so tests can substitute [`fake::FakePlatformClient`].

mod kube_impl;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snafu::Snafu;

pub use kube_impl::KubePlatformClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkloadKind {
    StatefulSet,
    Deployment,
}

/// One observed pod backing a workload. Only the fields the Checker/Healer
/// need (§4.1) are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub name: String,
    pub ip: Option<String>,
    pub phase: PodPhase,
    pub creation_timestamp: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
}

impl PodObservation {
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// A workload's label selector, the only part of its descriptor the
/// Checker/Healer need in order to project pods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub match_labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("getting {kind:?} {namespace}/{name}: {source}"))]
    GetWorkload { kind: WorkloadKind, namespace: String, name: String, source: kube::Error },

    #[snafu(display("{kind:?} {namespace}/{name} has no selector"))]
    MissingSelector { kind: WorkloadKind, namespace: String, name: String },

    #[snafu(display("listing pods for {kind:?} {namespace}/{name}: {source}"))]
    ListPods { kind: WorkloadKind, namespace: String, name: String, source: kube::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Narrow capability surface: read pods of a named workload, and read the
/// workload itself (for selector resolution). No mutation (§9 Design Notes).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn get_workload(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<WorkloadDescriptor>;

    async fn list_pods_of(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<Vec<PodObservation>>;
}
