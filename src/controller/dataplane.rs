//! DataPlane reconciler
//!
//! Entry point for the DataPlane controller: delegates to the
//! Blue-Green rollout state machine when a rollout strategy is
//! configured, otherwise runs the standard ensure pass over the live
//! generation's owned resources.

use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Api, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::conditions::{
    self, new_condition, set_condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_TYPE_READY,
};
use super::labels::ServiceState;
use super::resources::deployment::ensure_deployment;
use super::resources::secret::ensure_tls_secret;
use super::resources::service::{ensure_admin_service, ensure_proxy_service, service_addresses};
use super::rollout;
use super::{publish_event, Context, ReconcileError, CONVERGING_REQUEUE, DEFAULT_REQUEUE};
use crate::crd::dataplane::{DataPlane, DataPlaneStatus};

/// Reconcile one DataPlane.
pub async fn reconcile(
    dataplane: Arc<DataPlane>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = dataplane.name_any();
    let namespace = dataplane.namespace().unwrap_or_default();
    let started = Instant::now();

    info!(dataplane = %name, namespace = %namespace, "Reconciling DataPlane");

    let result = if rollout_configured(&dataplane) {
        rollout::reconcile_blue_green(&dataplane, &ctx).await
    } else {
        reconcile_standard(&dataplane, &ctx).await
    };

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(action) => {
            ctx.metrics.record_reconciliation_success("dataplane", elapsed);
            Ok(action)
        }
        Err(e) if e.is_conflict() => {
            // Optimistic-concurrency conflict: requeue immediately so
            // the next attempt re-reads fresh state
            debug!(dataplane = %name, "Write conflict, requeueing immediately");
            ctx.metrics.record_reconciliation_conflict("dataplane", elapsed);
            Ok(Action::requeue(Duration::ZERO))
        }
        Err(ReconcileError::DuplicatesReduced { kind, owner }) => {
            ctx.metrics.record_duplicate_reduction(kind);
            publish_event(
                &ctx,
                dataplane.as_ref(),
                EventType::Warning,
                "DuplicatesReduced",
                "Reduce",
                Some(format!("reduced duplicate {} objects", kind)),
            )
            .await;
            ctx.metrics.record_reconciliation_error("dataplane", elapsed);
            Err(ReconcileError::DuplicatesReduced { kind, owner })
        }
        Err(e) => {
            ctx.metrics.record_reconciliation_error("dataplane", elapsed);
            Err(e)
        }
    }
}

/// Standard (non-rollout) reconcile pass: converge the live generation
/// and publish observed state.
pub(crate) async fn reconcile_standard(
    dataplane: &DataPlane,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let (secret_outcome, _secret) =
        ensure_tls_secret(ctx, dataplane, ServiceState::Live).await?;

    let (deployment_outcome, deployment) =
        ensure_deployment(ctx, dataplane, ServiceState::Live).await?;

    // Services select pods by the ensured Deployment's own selector,
    // which is authoritative for whichever generation is live
    let pod_selector = deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();

    let (admin_outcome, _admin) =
        ensure_admin_service(ctx, dataplane, ServiceState::Live, &pod_selector).await?;
    let (proxy_outcome, proxy) = ensure_proxy_service(ctx, dataplane, &pod_selector).await?;

    let converging = secret_outcome.changed()
        || deployment_outcome.changed()
        || admin_outcome.changed()
        || proxy_outcome.changed();

    // Publish observed state; suppressed when nothing observable moved
    let current = dataplane.status.clone().unwrap_or_default();
    let mut updated = current.clone();

    let desired_replicas = dataplane.spec.deployment.replicas;
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    updated.ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    if available >= desired_replicas {
        set_condition(
            &mut updated,
            new_condition(
                CONDITION_TYPE_READY,
                CONDITION_TRUE,
                "DeploymentAvailable",
                "all desired replicas are available",
                dataplane.metadata.generation,
            ),
        );
    } else {
        set_condition(
            &mut updated,
            new_condition(
                CONDITION_TYPE_READY,
                CONDITION_FALSE,
                "DeploymentNotAvailable",
                &format!("{}/{} replicas available", available, desired_replicas),
                dataplane.metadata.generation,
            ),
        );
    }

    updated.addresses = service_addresses(&proxy);

    // Rollout status is cleared unless the Blue-Green machinery owns
    // the field; a rollout stanza without a blueGreen strategy runs
    // this standard path and must not keep stale rollout state around
    if !rollout_configured(dataplane) {
        updated.rollout = None;
    }

    if status_changed(&current, &updated) {
        patch_status(ctx, dataplane, &updated).await?;
    }

    if converging {
        Ok(Action::requeue(CONVERGING_REQUEUE))
    } else {
        Ok(Action::requeue(DEFAULT_REQUEUE))
    }
}

/// Whether a Blue-Green rollout strategy is configured for this
/// DataPlane (a rollout stanza alone is not enough).
pub(crate) fn rollout_configured(dataplane: &DataPlane) -> bool {
    dataplane
        .spec
        .rollout
        .as_ref()
        .is_some_and(|r| r.strategy.blue_green.is_some())
}

/// Whether two statuses differ in observable content.
pub(crate) fn status_changed(current: &DataPlaneStatus, updated: &DataPlaneStatus) -> bool {
    conditions::needs_status_update(&current.conditions, &updated.conditions)
        || current.addresses != updated.addresses
        || current.ready_replicas != updated.ready_replicas
        || current.rollout != updated.rollout
}

/// Write the status subresource with a single merge patch.
pub(crate) async fn patch_status(
    ctx: &Context,
    dataplane: &DataPlane,
    status: &DataPlaneStatus,
) -> Result<(), ReconcileError> {
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let api: Api<DataPlane> = Api::namespaced(ctx.client.clone(), &namespace);

    // An absent rollout field serializes as a skipped key, which a
    // merge patch treats as "leave unchanged"; emit an explicit null so
    // clearing stale rollout state actually removes it
    let mut body = serde_json::to_value(status).map_err(kube::Error::SerdeError)?;
    if status.rollout.is_none() {
        body["rollout"] = serde_json::Value::Null;
    }

    api.patch_status(
        &dataplane.name_any(),
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": body })),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
#[path = "dataplane_test.rs"]
mod tests;
