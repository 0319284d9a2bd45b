//! Reconciliation engine for portti managed resources
//!
//! `dataplane` and `controlplane` hold the per-kind reconcilers;
//! `rollout` is the Blue-Green state machine; `resources` are the
//! ensure operations for owned children; `owners`, `compare`,
//! `conditions` and `labels` are the leaf building blocks.

pub mod compare;
pub mod conditions;
pub mod controlplane;
pub mod dataplane;
pub mod labels;
pub mod owners;
pub mod resources;
pub mod rollout;

#[cfg(test)]
pub(crate) mod testutil;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::server::metrics::SharedMetrics;

/// How long to wait before retrying after a reconcile error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Steady-state resync interval
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(300);

/// Short requeue while owned resources are still converging
pub const CONVERGING_REQUEUE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("managed resource missing namespace")]
    MissingNamespace,

    #[error("managed resource has no uid assigned yet")]
    MissingUid,

    #[error("reduced duplicate {kind} objects owned by {owner}; ending cycle to re-read clean state")]
    DuplicatesReduced { kind: &'static str, owner: String },

    #[error("unknown promotion strategy {0:?}")]
    UnknownPromotionStrategy(String),

    #[error("unknown rollout resource plan {0:?}")]
    UnknownRolloutPlan(String),
}

impl ReconcileError {
    /// Optimistic-concurrency conflict on a write. Not a failure:
    /// callers convert it into a zero-backoff requeue so the next
    /// attempt re-reads fresh state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReconcileError::KubeError(kube::Error::Api(err)) if err.code == 409
        )
    }
}

/// Shared state handed to every reconcile invocation
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub metrics: SharedMetrics,
    reporter: Reporter,
}

impl Context {
    pub fn new(client: Client, metrics: SharedMetrics) -> Self {
        let reporter = Reporter {
            controller: "portti".to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Context {
            client,
            metrics,
            reporter,
        }
    }
}

/// Publish a Kubernetes Event attached to the given resource.
///
/// Publish failures are logged but never block reconciliation.
pub async fn publish_event<K>(
    ctx: &Context,
    obj: &K,
    type_: EventType,
    reason: &str,
    action: &str,
    note: Option<String>,
) where
    K: Resource<DynamicType = ()>,
{
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone());
    let reference = obj.object_ref(&());

    if let Err(e) = recorder
        .publish(
            &Event {
                type_,
                reason: reason.to_string(),
                note,
                action: action.to_string(),
                secondary: None,
            },
            &reference,
        )
        .await
    {
        warn!(error = %e, "Failed to publish event");
    }
}

/// Owner reference pointing at a managed resource, for garbage
/// collection of its children.
pub fn owner_reference<K>(owner: &K) -> Result<OwnerReference, ReconcileError>
where
    K: Resource<DynamicType = ()>,
{
    let uid = owner.meta().uid.clone().ok_or(ReconcileError::MissingUid)?;

    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Error policy shared by both controllers.
///
/// Uses `warn!` since reconciliation errors are expected and trigger
/// retries with a fixed backoff.
pub fn error_policy<K>(resource: Arc<K>, error: &ReconcileError, _ctx: Arc<Context>) -> Action
where
    K: ResourceExt<DynamicType = ()>,
{
    warn!(
        resource = %resource.name_any(),
        error = ?error,
        "Reconcile error (will retry)"
    );
    Action::requeue(ERROR_REQUEUE)
}
