//! Production [`PlatformClient`], grounded on `service/kubernetes/deployment.go`
//! and `service/kubernetes/statefulset.go` in the upstream Go operator: fetch
//! the workload, project its `spec.selector.matchLabels` into a label
//! selector string, then list pods.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use snafu::ResultExt;

use super::{
    Error, GetWorkloadSnafu, ListPodsSnafu, MissingSelectorSnafu, PlatformClient, PodObservation, PodPhase, Result,
    WorkloadDescriptor, WorkloadKind,
};

#[derive(Clone)]
pub struct KubePlatformClient {
    client: Client,
}

impl KubePlatformClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn selector_string(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<String> {
        let descriptor = self.get_workload(kind, namespace, name).await?;
        if descriptor.match_labels.is_empty() {
            return MissingSelectorSnafu { kind, namespace, name }.fail();
        }
        Ok(descriptor
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","))
    }
}

#[async_trait]
impl PlatformClient for KubePlatformClient {
    async fn get_workload(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<WorkloadDescriptor> {
        let match_labels: BTreeMap<String, String> = match kind {
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                let ss = api
                    .get(name)
                    .await
                    .context(GetWorkloadSnafu { kind, namespace, name })?;
                ss.spec
                    .and_then(|s| s.selector.match_labels)
                    .unwrap_or_default()
            }
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                let d = api
                    .get(name)
                    .await
                    .context(GetWorkloadSnafu { kind, namespace, name })?;
                d.spec.and_then(|s| s.selector.match_labels).unwrap_or_default()
            }
        };
        Ok(WorkloadDescriptor { match_labels })
    }

    async fn list_pods_of(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Result<Vec<PodObservation>> {
        let selector = self.selector_string(kind, namespace, name).await?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(&selector))
            .await
            .context(ListPodsSnafu { kind, namespace, name })?;
        Ok(pods.items.into_iter().filter_map(to_observation).collect())
    }
}

fn to_observation(pod: k8s_openapi::api::core::v1::Pod) -> Option<PodObservation> {
    let name = pod.metadata.name?;
    let creation_timestamp = pod
        .metadata
        .creation_timestamp
        .map(|t| t.0)
        .unwrap_or_else(Utc::now);
    let status = pod.status.unwrap_or_default();
    let phase = match status.phase.as_deref() {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    };
    let start_time: Option<DateTime<Utc>> = status.start_time.map(|t| t.0);
    Some(PodObservation { name, ip: status.pod_ip, phase, creation_timestamp, start_time })
}
