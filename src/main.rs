//! Process bootstrap for the `redis-operator` controller binary: parse CLI
//! flags, install structured logging, build the `kube::Client`, start the
//! metrics server, and run the reconcile loop until a shutdown signal
//! arrives (§2 Bootstrap, ambient to the reconciliation core).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::{Parser, ValueEnum};
use redis_operator::metrics::Registered;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Kubernetes operator for highly-available Redis/Sentinel clusters.
#[derive(Debug, Parser)]
#[command(name = "redis-operator", version)]
struct Cli {
    /// Address the Prometheus metrics endpoint binds to.
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Log output format.
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Accepted for forward compatibility with a multi-replica deployment;
    /// the reconcile loop is currently written assuming a single active
    /// instance (§5, §9), so enabling this only logs a warning today.
    #[arg(long, env = "LEADER_ELECTION", default_value_t = false)]
    leader_election: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "redis_operator=info,kube=info".to_string());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

async fn metrics_handler(State(registered): State<Arc<Registered>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        registered.gather(),
    )
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn serve_metrics(addr: SocketAddr, registered: Arc<Registered>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(registered);
    info!(%addr, "metrics endpoint listening");
    if let Err(err) = axum::Server::bind(&addr).serve(app.into_make_service()).await {
        warn!(%err, "metrics server exited");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if cli.leader_election {
        warn!("leader election requested but not implemented; run exactly one replica of this operator");
    }

    let client = match kube::Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%err, "failed to build a Kubernetes client from the ambient kubeconfig");
            std::process::exit(1);
        }
    };

    let registered = Arc::new(Registered::new());
    let metrics_server = tokio::spawn(serve_metrics(cli.metrics_addr, registered.clone()));

    info!("starting redis-operator reconcile loop");
    redis_operator::reconciler::run(client, registered.metrics.clone()).await;

    metrics_server.abort();
}
