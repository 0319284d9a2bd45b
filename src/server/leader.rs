//! Lease-based leader election
//!
//! Multi-replica deployments elect a single active reconciler through a
//! coordination.k8s.io/v1 Lease. Each tick the elector reads the Lease,
//! classifies it relative to this instance, and either renews, claims,
//! or stands by. On shutdown the lease is released so a peer can take
//! over without waiting out the TTL.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ShutdownSignal;

/// How long leadership is valid without renewal
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(15);

/// Renewal cadence, roughly a third of the TTL
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Leader election configuration
#[derive(Clone)]
pub struct LeaderConfig {
    /// Unique identifier for this instance (usually pod name)
    pub holder_id: String,
    /// Name of the Lease resource
    pub lease_name: String,
    /// Namespace for the Lease resource
    pub lease_namespace: String,
    /// How long leadership is valid (in seconds)
    pub lease_duration_seconds: i32,
    /// How often to renew leadership
    pub renew_interval: Duration,
}

impl LeaderConfig {
    /// Create config from environment variables
    ///
    /// Uses:
    /// - `POD_NAME` for holder_id (falls back to hostname or UUID)
    /// - `POD_NAMESPACE` for lease_namespace (falls back to "portti-system")
    pub fn from_env() -> Self {
        let holder_id = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("portti-{}", uuid::Uuid::new_v4()));

        let lease_namespace =
            std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "portti-system".to_string());

        Self {
            holder_id,
            lease_name: "portti-leader".to_string(),
            lease_namespace,
            lease_duration_seconds: DEFAULT_LEASE_TTL.as_secs() as i32,
            renew_interval: DEFAULT_RENEW_INTERVAL,
        }
    }
}

/// Shared leadership flag, cloned into whoever needs to check it
#[derive(Clone)]
pub struct LeaderState {
    is_leader: Arc<AtomicBool>,
}

impl LeaderState {
    pub fn new() -> Self {
        Self {
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Set by the election loop, and by main() when running
    /// single-instance with election disabled.
    pub fn set_leader(&self, is_leader: bool) {
        self.is_leader.store(is_leader, Ordering::SeqCst);
    }
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an observed Lease stands relative to this instance.
#[derive(Debug, PartialEq, Eq)]
enum LeaseDisposition {
    /// We hold it; refresh the renew time
    OursToRenew,
    /// Unheld, expired, or malformed; claimable with a transition bump
    Claimable { transitions: i32 },
    /// Held by a peer whose TTL has not lapsed
    HeldByOther,
}

/// Classify a Lease against this holder at the given instant.
///
/// A lease with no renew time or duration counts as claimable: there is
/// nothing to wait out.
fn classify_lease(lease: &Lease, holder_id: &str, now: DateTime<Utc>) -> LeaseDisposition {
    let spec = lease.spec.as_ref();

    if spec.and_then(|s| s.holder_identity.as_deref()) == Some(holder_id) {
        return LeaseDisposition::OursToRenew;
    }

    let held = spec.is_some_and(|s| s.holder_identity.is_some());
    let fresh = spec
        .and_then(|s| Some((s.renew_time.as_ref()?, s.lease_duration_seconds?)))
        .is_some_and(|(MicroTime(renewed), ttl)| {
            now <= *renewed + chrono::Duration::seconds(ttl as i64)
        });

    if held && fresh {
        LeaseDisposition::HeldByOther
    } else {
        LeaseDisposition::Claimable {
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
        }
    }
}

struct Elector {
    api: Api<Lease>,
    config: LeaderConfig,
    state: LeaderState,
}

impl Elector {
    /// One election pass: claim or renew, then fold the outcome into
    /// the shared state with transition logging.
    async fn tick(&self) {
        match self.try_claim().await {
            Ok(leading) => {
                let was_leading = self.state.is_leader();
                self.state.set_leader(leading);

                if leading && !was_leading {
                    info!(holder_id = %self.config.holder_id, "Acquired leadership");
                } else if !leading && was_leading {
                    warn!(holder_id = %self.config.holder_id, "Lost leadership");
                }
            }
            Err(e) => {
                warn!(error = %e, "Lease claim failed");
                // Unverifiable leadership is treated as lost
                if self.state.is_leader() {
                    warn!(holder_id = %self.config.holder_id, "Lost leadership due to error");
                    self.state.set_leader(false);
                }
            }
        }
    }

    async fn try_claim(&self) -> Result<bool, kube::Error> {
        let now = MicroTime(Utc::now());

        let lease = match self.api.get(&self.config.lease_name).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(err)) if err.code == 404 => {
                return self.create_lease(&now).await;
            }
            Err(e) => return Err(e),
        };

        match classify_lease(&lease, &self.config.holder_id, now.0) {
            LeaseDisposition::OursToRenew => {
                debug!(holder_id = %self.config.holder_id, "Renewing lease");
                let refresh = serde_json::json!({
                    "spec": {
                        "renewTime": now,
                        "leaseDurationSeconds": self.config.lease_duration_seconds,
                    }
                });
                self.patch_lease(&refresh).await?;
                Ok(true)
            }
            LeaseDisposition::Claimable { transitions } => {
                debug!(holder_id = %self.config.holder_id, "Lease claimable, taking over");
                let takeover = serde_json::json!({
                    "spec": {
                        "holderIdentity": self.config.holder_id,
                        "acquireTime": now,
                        "renewTime": now,
                        "leaseDurationSeconds": self.config.lease_duration_seconds,
                        "leaseTransitions": transitions + 1,
                    }
                });
                self.patch_lease(&takeover).await?;
                Ok(true)
            }
            LeaseDisposition::HeldByOther => {
                debug!(holder_id = %self.config.holder_id, "Lease held by a peer");
                Ok(false)
            }
        }
    }

    async fn create_lease(&self, now: &MicroTime) -> Result<bool, kube::Error> {
        info!(holder_id = %self.config.holder_id, "Creating new lease");
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.config.lease_name.clone()),
                namespace: Some(self.config.lease_namespace.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.config.holder_id.clone()),
                acquire_time: Some(now.clone()),
                renew_time: Some(now.clone()),
                lease_duration_seconds: Some(self.config.lease_duration_seconds),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };

        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            // A peer created it first; normal race, stand by until the
            // next tick re-reads it
            Err(kube::Error::Api(err)) if err.code == 409 => {
                info!(holder_id = %self.config.holder_id, "Lease created by a peer first");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn patch_lease(&self, patch: &serde_json::Value) -> Result<(), kube::Error> {
        self.api
            .patch(
                &self.config.lease_name,
                &PatchParams::default(),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }

    /// Best-effort release on shutdown: clearing the holder lets a peer
    /// claim immediately instead of waiting out the TTL. A failed
    /// release falls back to natural expiry.
    async fn release(&self) {
        if !self.state.is_leader() {
            return;
        }
        self.state.set_leader(false);

        let surrender = serde_json::json!({"spec": {"holderIdentity": null}});
        if let Err(e) = self.patch_lease(&surrender).await {
            warn!(error = %e, "Could not release lease; it will expire on its own");
        } else {
            info!(holder_id = %self.config.holder_id, "Released lease");
        }
    }
}

/// Run the leader election loop until shutdown, keeping `state` in sync
/// with this instance's leadership.
pub async fn run_leader_election(
    client: Client,
    config: LeaderConfig,
    state: LeaderState,
    mut shutdown: ShutdownSignal,
) {
    let elector = Elector {
        api: Api::namespaced(client, &config.lease_namespace),
        config,
        state,
    };

    info!(
        holder_id = %elector.config.holder_id,
        lease_name = %elector.config.lease_name,
        lease_namespace = %elector.config.lease_namespace,
        "Starting leader election"
    );

    // interval fires its first tick immediately, so acquisition is
    // attempted right away on startup
    let mut ticks = tokio::time::interval(elector.config.renew_interval);

    loop {
        tokio::select! {
            _ = ticks.tick() => elector.tick().await,
            _ = shutdown.wait() => {
                info!("Leader election shutting down");
                elector.release().await;
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "leader_test.rs"]
mod tests;
