//! Operational plumbing around the controllers
//!
//! - `health`: HTTP server for Kubernetes probes and /metrics
//! - `metrics`: Prometheus registry shared across the controllers
//! - `leader`: Lease-based leader election for multi-replica safety

pub mod health;
pub mod leader;
pub mod metrics;

pub use health::{run_health_server, ReadinessState};
pub use leader::{run_leader_election, LeaderConfig, LeaderState};
pub use metrics::{create_metrics, ControllerMetrics, SharedMetrics};

use tokio::sync::watch;

/// Receiver half of the process shutdown broadcast.
///
/// Cloned into every long-running task; `wait` resolves once shutdown
/// is requested (or the sender is dropped).
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, ShutdownSignal { rx })
    }

    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
