use futures::StreamExt;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use portti::controller::{controlplane, dataplane, error_policy, Context};
use portti::crd::controlplane::ControlPlane;
use portti::crd::dataplane::DataPlane;
use portti::server::{
    create_metrics, run_health_server, run_leader_election, LeaderConfig, LeaderState,
    ReadinessState, ShutdownSignal,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port for health and metrics endpoints
const HEALTH_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting portti gateway operator");

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();
    let metrics = create_metrics()?;

    // Start health server in background
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(HEALTH_PORT, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = HEALTH_PORT, "Health server task spawned");

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    // Leader election keeps multi-replica deployments from reconciling
    // the same objects concurrently; opt out for local runs
    let leader_state = LeaderState::new();
    let leader_election_enabled = std::env::var("PORTTI_LEADER_ELECTION")
        .map(|v| v != "false")
        .unwrap_or(true);

    let mut shutdown_tx = None;
    if leader_election_enabled {
        let (tx, shutdown) = ShutdownSignal::channel();
        shutdown_tx = Some(tx);
        let config = LeaderConfig::from_env();
        tokio::spawn(run_leader_election(
            client.clone(),
            config,
            leader_state.clone(),
            shutdown,
        ));

        while !leader_state.is_leader() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        info!("Leadership acquired");
    } else {
        leader_state.set_leader(true);
        info!("Leader election disabled");
    }

    // Shared controller context
    let ctx = Arc::new(Context::new(client.clone(), metrics));

    // Mark as ready - operator is initialized and about to start
    readiness.set_ready();
    info!("Operator ready, starting reconciliation loops");

    let dataplanes = Api::<DataPlane>::all(client.clone());
    let controlplanes = Api::<ControlPlane>::all(client.clone());

    // Note: error_policy already logs errors with warn!, so we only
    // log success here
    let dataplane_controller = Controller::new(dataplanes, watcher::Config::default())
        .shutdown_on_signal()
        .run(dataplane::reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled DataPlane: {:?}", o);
            }
        });

    let controlplane_controller = Controller::new(controlplanes, watcher::Config::default())
        .shutdown_on_signal()
        .run(controlplane::reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled ControlPlane: {:?}", o);
            }
        });

    tokio::join!(dataplane_controller, controlplane_controller);

    if let Some(tx) = shutdown_tx {
        let _ = tx.send(true);
    }
    info!("Operator shut down");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
