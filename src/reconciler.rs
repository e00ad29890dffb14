//! Handles one `(namespace, name)` event (§4.7): load the CR, apply defaults,
//! run the syncers, invoke the orchestrator. Finalizer cleanup only matters
//! when a persistent claim was created without an owner reference.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, ListParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::{watcher, Controller};
use kube::{Client, ResourceExt};
use snafu::{ResultExt, Snafu};
use tracing::{error, info, warn};

use crate::crd::{RedisCluster, StorageSettings};
use crate::metrics::Metrics;
use crate::orchestrator::FailoverOrchestrator;
use crate::platform::KubePlatformClient;
use crate::redis_client::TcpRedisProtocolClient;
use crate::syncer::Syncer;

/// Bound on an entire reconcile pass (§5): suggested 30s.
const PASS_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{source}"))]
    Sync { source: crate::syncer::Error },

    #[snafu(display("{source}"))]
    Heal { source: crate::orchestrator::Error },

    #[snafu(display("{source}"))]
    Finalizer { source: Box<kube::runtime::finalizer::Error<Error>> },

    #[snafu(display("patching status for {namespace}/{name}: {source}"))]
    PatchStatus { namespace: String, name: String, source: kube::Error },

    #[snafu(display("reconcile pass for {namespace}/{name} exceeded its deadline"))]
    Deadline { namespace: String, name: String },

    #[snafu(display("deleting orphaned claim {namespace}/{name}: {source}"))]
    DeleteClaim { namespace: String, name: String, source: kube::Error },
}

impl From<crate::syncer::Error> for Error {
    fn from(source: crate::syncer::Error) -> Self {
        Error::Sync { source }
    }
}

impl From<crate::orchestrator::Error> for Error {
    fn from(source: crate::orchestrator::Error) -> Self {
        Error::Heal { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Context {
    pub client: Client,
    pub metrics: Metrics,
}

impl Context {
    pub fn new(client: Client, metrics: Metrics) -> Arc<Self> {
        Arc::new(Self { client, metrics })
    }
}

impl Error {
    /// Coarse stage label for the `redis_operator_reconcile_errors_total`
    /// counter; never the full `Display` message (unbounded cardinality).
    fn stage(&self) -> &'static str {
        match self {
            Error::Sync { .. } => "sync",
            Error::Heal { .. } => "heal",
            Error::Finalizer { .. } => "finalizer",
            Error::PatchStatus { .. } => "patch_status",
            Error::Deadline { .. } => "deadline",
            Error::DeleteClaim { .. } => "delete_claim",
        }
    }
}

async fn reconcile_cluster(cluster: &RedisCluster, client: &Client) -> Result<()> {
    let mut cluster = cluster.clone();
    cluster.apply_defaults();

    let syncer = Syncer::new(client.clone());
    syncer.sync_all(&cluster).await?;

    let platform = std::sync::Arc::new(KubePlatformClient::new(client.clone()));
    let redis = std::sync::Arc::new(TcpRedisProtocolClient::new());
    let orchestrator = FailoverOrchestrator::new(platform, redis);
    orchestrator.check_and_heal(&cluster).await?;

    patch_status(&cluster, client).await?;
    Ok(())
}

async fn patch_status(cluster: &RedisCluster, client: &Client) -> Result<()> {
    use crate::crd::{Condition, RedisClusterStatus};
    use kube::api::{Patch, PatchParams};

    let namespace = cluster.namespace_unchecked();
    let name = cluster.name_unchecked();
    let api: Api<RedisCluster> = Api::namespaced(client.clone(), &namespace);

    let status = RedisClusterStatus {
        observed_primary: None,
        conditions: vec![Condition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            reason: "Reconciled".to_string(),
            message: "cluster converged".to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
        }],
    };
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&name, &PatchParams::apply(crate::constants::FIELD_MANAGER).force(), &Patch::Merge(patch))
        .await
        .context(PatchStatusSnafu { namespace, name })?;
    Ok(())
}

/// Cleanup is a no-op when `keepAfterDeletion` is set (the claim is
/// intentionally left behind) or when the claim is owner-referenced (the API
/// server garbage-collects it with the rest of the managed objects). It only
/// has to act as a safety net for a claim that somehow ended up without an
/// owner reference while `keepAfterDeletion` is false.
async fn cleanup(cluster: &RedisCluster, client: &Client) -> Result<()> {
    let keep_after_deletion = matches!(
        &cluster.spec.redis.storage,
        StorageSettings::PersistentClaim { keep_after_deletion: true, .. }
    );
    if keep_after_deletion {
        return Ok(());
    }

    let namespace = cluster.namespace_unchecked();
    let name = crate::constants::REDIS_STORAGE_VOLUME_NAME.to_string();
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &namespace);
    match api.get(&name).await {
        Ok(pvc) if pvc.metadata.owner_references.unwrap_or_default().is_empty() => {
            api.delete(&name, &Default::default())
                .await
                .context(DeleteClaimSnafu { namespace: namespace.clone(), name: name.clone() })?;
            info!(namespace = %namespace, name = %name, "deleted orphaned claim with no owner reference");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(source) => Err(Error::DeleteClaim { namespace, name, source }),
    }
}

pub async fn reconcile(cluster: Arc<RedisCluster>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = cluster.namespace_unchecked();
    let api: Api<RedisCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let started = std::time::Instant::now();

    let outcome = tokio::time::timeout(PASS_DEADLINE, async {
        finalizer(&api, crate::constants::FINALIZER, cluster.clone(), |event| async {
            match event {
                FinalizerEvent::Apply(cluster) => reconcile_cluster(&cluster, &ctx.client).await,
                FinalizerEvent::Cleanup(cluster) => cleanup(&cluster, &ctx.client).await,
            }
        })
        .await
        .map_err(|source| Error::Finalizer { source: Box::new(source) })
    })
    .await;

    let result = match outcome {
        Ok(Ok(())) => Ok(Action::await_change()),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(Error::Deadline { namespace, name: cluster.name_unchecked() }),
    };

    match &result {
        Ok(_) => ctx.metrics.record_success(started.elapsed()),
        Err(err) => ctx.metrics.record_error(err.stage(), started.elapsed()),
    }
    result
}

pub fn error_policy(cluster: Arc<RedisCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(cluster = %cluster.name_unchecked(), %error, "reconcile failed, requeuing with backoff");
    Action::requeue(Duration::from_secs(30))
}

pub async fn run(client: Client, metrics: Metrics) {
    let clusters: Api<RedisCluster> = Api::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!(error = %e, "RedisCluster CRD is not queryable; is it installed?");
        info!("install it with: redis-operator crdgen | kubectl apply -f -");
        std::process::exit(1);
    }

    let ctx = Context::new(client.clone(), metrics);
    Controller::new(clusters, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((object, _action)) => info!(cluster = %object.name, "reconciled"),
                Err(err) => warn!(%err, "reconcile stream error"),
            }
        })
        .await;
}
