//! In-memory [`PlatformClient`] used by Checker/Healer/Orchestrator tests
//! (§9 Design Notes: "back these with in-memory fakes for tests").

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PlatformClient, PodObservation, Result, WorkloadDescriptor, WorkloadKind};

#[derive(Default)]
pub struct FakePlatformClient {
    pods: Mutex<BTreeMap<(WorkloadKind, String, String), Vec<PodObservation>>>,
}

impl FakePlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pods(&self, kind: WorkloadKind, namespace: &str, name: &str, pods: Vec<PodObservation>) {
        self.pods
            .lock()
            .unwrap()
            .insert((kind, namespace.to_string(), name.to_string()), pods);
    }
}

#[async_trait]
impl PlatformClient for FakePlatformClient {
    async fn get_workload(&self, _kind: WorkloadKind, _namespace: &str, _name: &str) -> Result<WorkloadDescriptor> {
        Ok(WorkloadDescriptor::default())
    }

    async fn list_pods_of(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<Vec<PodObservation>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
