//! Materializes the managed objects for a [`RedisCluster`] (§4.6): server-side
//! apply, fixed field manager, fixed dispatch order (Services → ConfigMaps →
//! Deployment → StatefulSet) so network identity and config exist before the
//! workloads that depend on them start.

mod templates;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use snafu::{ResultExt, Snafu};

use crate::crd::RedisCluster;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("applying {kind} {namespace}/{name}: {source}"))]
    Apply { kind: &'static str, namespace: String, name: String, source: kube::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub kind: &'static str,
    pub name: String,
}

pub struct Syncer {
    client: Client,
}

impl Syncer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn sync_all(&self, cluster: &RedisCluster) -> Result<Vec<SyncResult>> {
        let ns = cluster.namespace_unchecked();
        let mut results = Vec::with_capacity(7);

        results.push(self.apply::<Service>(cluster, "Service", &ns, templates::redis_headless_service(cluster)).await?);
        results.push(self.apply::<Service>(cluster, "Service", &ns, templates::sentinel_service(cluster)).await?);
        results.push(self.apply::<ConfigMap>(cluster, "ConfigMap", &ns, templates::redis_configmap(cluster)).await?);
        results.push(
            self.apply::<ConfigMap>(cluster, "ConfigMap", &ns, templates::redis_shutdown_configmap(cluster)).await?,
        );
        results.push(self.apply::<ConfigMap>(cluster, "ConfigMap", &ns, templates::sentinel_configmap(cluster)).await?);
        results.push(self.apply::<Deployment>(cluster, "Deployment", &ns, templates::sentinel_deployment(cluster)).await?);
        results.push(self.apply::<StatefulSet>(cluster, "StatefulSet", &ns, templates::redis_statefulset(cluster)).await?);

        Ok(results)
    }

    async fn apply<K>(&self, cluster: &RedisCluster, kind: &'static str, namespace: &str, object: K) -> Result<SyncResult>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + std::fmt::Debug
            + serde::Serialize
            + serde::de::DeserializeOwned,
    {
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(crate::constants::FIELD_MANAGER).force();
        let outcome = api
            .patch(&name, &params, &Patch::Apply(&object))
            .await
            .context(ApplySnafu { kind, namespace: namespace.to_string(), name: name.clone() });

        self.emit_event(cluster, kind, &name, outcome.is_ok()).await;
        outcome?;
        Ok(SyncResult { kind, name })
    }

    async fn emit_event(&self, cluster: &RedisCluster, kind: &'static str, name: &str, succeeded: bool) {
        let recorder = Recorder::new(self.client.clone(), reporter(), cluster.object_ref(&()));
        let event = if succeeded {
            Event {
                type_: EventType::Normal,
                reason: "Synced".to_string(),
                note: Some(format!("applied {kind} {name}")),
                action: "Sync".to_string(),
                secondary: None,
            }
        } else {
            Event {
                type_: EventType::Warning,
                reason: "SyncFailed".to_string(),
                note: Some(format!("failed to apply {kind} {name}")),
                action: "Sync".to_string(),
                secondary: None,
            }
        };
        if let Err(err) = recorder.publish(event).await {
            tracing::warn!(%err, cluster = %cluster.name_unchecked(), "failed to publish sync event");
        }
    }
}

fn reporter() -> Reporter {
    crate::constants::FIELD_MANAGER.into()
}
