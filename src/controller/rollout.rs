//! Blue-Green rollout state machine for DataPlane
//!
//! There is no stored rollout phase: each pass re-derives where the
//! rollout stands from durable cluster state (the live Deployment's
//! template hash versus the target hash, preview presence and
//! readiness, and the promotion gate annotation), acts once, and
//! requeues. This makes every step idempotent and crash-resumable.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

use super::conditions::{
    self, new_condition, set_condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_TYPE_ROLLED_OUT,
};
use super::dataplane;
use super::labels::{
    owned_labels, owned_service_labels, ServiceKind, ServiceState, ANNOTATION_PROMOTE_WHEN_READY,
    LABEL_SERVICE_STATE, LABEL_TEMPLATE_HASH, MANAGED_BY_DATAPLANE,
};
use super::owners::{list_owned, reduce_duplicates};
use super::resources::deployment::{ensure_deployment, target_template_hash};
use super::resources::secret::ensure_tls_secret;
use super::resources::service::{ensure_admin_service, ensure_proxy_service, service_addresses};
use super::{publish_event, Context, ReconcileError, CONVERGING_REQUEUE, DEFAULT_REQUEUE};
use crate::crd::dataplane::{
    DataPlane, DataPlaneRolloutStatus, RolloutStatusService, RolloutStatusServices,
};

/// How a rollout moves from preview to live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromotionStrategy {
    /// Promote as soon as the preview generation is ready
    Automatic,
    /// Hold at the promotion point until the operator opens the gate
    BreakBeforePromotion,
}

impl PromotionStrategy {
    pub fn from_spec(value: &str) -> Result<Self, ReconcileError> {
        match value {
            "AutomaticPromotion" => Ok(PromotionStrategy::Automatic),
            "BreakBeforePromotion" => Ok(PromotionStrategy::BreakBeforePromotion),
            other => Err(ReconcileError::UnknownPromotionStrategy(other.to_string())),
        }
    }
}

/// What happens to the outgoing live Deployment on promotion, and to a
/// matching parked Deployment on the next rollout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentRolloutPlan {
    /// Park the demoted Deployment at zero replicas; a rollback to the
    /// same template reuses it
    ScaleDownOnPromotionScaleUpOnRollout,
    /// Delete the demoted Deployment outright
    DeleteOnPromotionRecreateOnRollout,
}

impl DeploymentRolloutPlan {
    pub fn from_spec(value: Option<&str>) -> Result<Self, ReconcileError> {
        match value {
            None | Some("ScaleDownOnPromotionScaleUpOnRollout") => {
                Ok(DeploymentRolloutPlan::ScaleDownOnPromotionScaleUpOnRollout)
            }
            Some("DeleteOnPromotionRecreateOnRollout") => {
                Ok(DeploymentRolloutPlan::DeleteOnPromotionRecreateOnRollout)
            }
            Some(other) => Err(ReconcileError::UnknownRolloutPlan(other.to_string())),
        }
    }
}

fn configured_strategy(dataplane: &DataPlane) -> Result<PromotionStrategy, ReconcileError> {
    let raw = dataplane
        .spec
        .rollout
        .as_ref()
        .and_then(|r| r.strategy.blue_green.as_ref())
        .map(|bg| bg.promotion.strategy.as_str())
        .unwrap_or("BreakBeforePromotion");

    PromotionStrategy::from_spec(raw)
}

fn configured_plan(dataplane: &DataPlane) -> Result<DeploymentRolloutPlan, ReconcileError> {
    let raw = dataplane
        .spec
        .rollout
        .as_ref()
        .and_then(|r| r.strategy.blue_green.as_ref())
        .and_then(|bg| bg.resources.as_ref())
        .and_then(|r| r.plan.as_ref())
        .and_then(|p| p.deployment.as_deref());

    DeploymentRolloutPlan::from_spec(raw)
}

/// Whether the operator has opened the promotion gate.
pub fn promotion_gate_open(dataplane: &DataPlane) -> bool {
    dataplane
        .annotations()
        .get(ANNOTATION_PROMOTE_WHEN_READY)
        .map(String::as_str)
        == Some("true")
}

/// Whether a ready preview generation may be promoted right now.
///
/// An unknown strategy string is a configuration error, never a silent
/// fall-through to either behavior.
pub fn can_proceed_with_promotion(dataplane: &DataPlane) -> Result<bool, ReconcileError> {
    match configured_strategy(dataplane)? {
        PromotionStrategy::Automatic => Ok(true),
        PromotionStrategy::BreakBeforePromotion => Ok(promotion_gate_open(dataplane)),
    }
}

/// One pass of the Blue-Green state machine.
pub(crate) async fn reconcile_blue_green(
    dataplane: &DataPlane,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let status = dataplane.status.clone().unwrap_or_default();

    // A rollout only starts from a ready live generation; until then
    // the standard reconciler provisions one
    if !conditions::is_ready(&status) {
        return dataplane::reconcile_standard(dataplane, ctx).await;
    }

    let name = dataplane.name_any();
    let Some(live) = find_live_deployment(ctx, dataplane).await? else {
        return dataplane::reconcile_standard(dataplane, ctx).await;
    };

    let target = target_template_hash(dataplane);
    let live_hash = live.labels().get(LABEL_TEMPLATE_HASH).cloned();

    if live_hash.as_deref() == Some(target.as_str()) {
        finish_rollout(ctx, dataplane, &target).await?;
        return dataplane::reconcile_standard(dataplane, ctx).await;
    }

    debug!(
        dataplane = %name,
        live_hash = ?live_hash,
        target_hash = %target,
        "Template drift detected, driving Blue-Green rollout"
    );

    // Provision the preview generation next to the live one. A parked
    // Deployment with the target hash is scaled back up here; one with
    // a different hash is replaced.
    let (dep_outcome, preview) = ensure_deployment(ctx, dataplane, ServiceState::Preview).await?;
    let preview_selector = preview
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();
    let (secret_outcome, _) = ensure_tls_secret(ctx, dataplane, ServiceState::Preview).await?;
    let (svc_outcome, preview_admin) =
        ensure_admin_service(ctx, dataplane, ServiceState::Preview, &preview_selector).await?;

    if dep_outcome.changed() || secret_outcome.changed() || svc_outcome.changed() {
        return Ok(Action::requeue(CONVERGING_REQUEUE));
    }

    let preview_ready = preview
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
        >= dataplane.spec.deployment.replicas;

    // Publish the preview admin endpoint so configuration can be
    // pushed to the new generation before any traffic moves
    sync_rollout_status(ctx, dataplane, &preview_admin, preview_ready).await?;

    if !preview_ready {
        return Ok(Action::requeue(CONVERGING_REQUEUE));
    }

    if !can_proceed_with_promotion(dataplane)? {
        return Ok(Action::requeue(DEFAULT_REQUEUE));
    }

    promote(ctx, dataplane, &live, &preview).await?;

    info!(dataplane = %name, hash = %target, "Promoted preview generation to live");
    ctx.metrics.record_promotion();
    publish_event(
        ctx,
        dataplane,
        EventType::Normal,
        "DataPlanePromoted",
        "Promote",
        Some(format!("promoted template generation {} to live", target)),
    )
    .await;

    Ok(Action::requeue(CONVERGING_REQUEUE))
}

/// Switch traffic and ownership over to the preview generation.
///
/// Each step is idempotent and ordered so a crash at any point resumes
/// correctly: traffic cutover first, the promotion gate cleared last.
async fn promote(
    ctx: &Context,
    dataplane: &DataPlane,
    live: &Deployment,
    preview: &Deployment,
) -> Result<(), ReconcileError> {
    let plan = configured_plan(dataplane)?;
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = dataplane.name_any();
    let uid = dataplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    let preview_selector = preview
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();

    // 1. Traffic cutover: point the proxy Service at the preview pods
    ensure_proxy_service(ctx, dataplane, &preview_selector).await?;

    // 2. Retire the outgoing generation's admin Service and Secret
    // before relabeling, so the duplicate reducer never sees two live
    // objects and picks the older one as survivor
    let old_admin = list_owned(
        &services,
        &uid,
        &owned_service_labels(
            MANAGED_BY_DATAPLANE,
            &name,
            ServiceState::Live,
            ServiceKind::Admin,
        ),
    )
    .await?;
    for svc in &old_admin {
        delete_tolerant(&services, &svc.name_any()).await?;
    }
    let old_secrets = list_owned(
        &secrets,
        &uid,
        &owned_labels(MANAGED_BY_DATAPLANE, &name, ServiceState::Live),
    )
    .await?;
    for secret in &old_secrets {
        delete_tolerant(&secrets, &secret.name_any()).await?;
    }

    // 3. Demote the outgoing live Deployment per the configured plan
    match plan {
        DeploymentRolloutPlan::ScaleDownOnPromotionScaleUpOnRollout => {
            let park = serde_json::json!({
                "metadata": {"labels": {LABEL_SERVICE_STATE: ServiceState::Preview.as_str()}},
                "spec": {"replicas": 0},
            });
            deployments
                .patch(&live.name_any(), &PatchParams::default(), &Patch::Merge(&park))
                .await?;
        }
        DeploymentRolloutPlan::DeleteOnPromotionRecreateOnRollout => {
            delete_tolerant(&deployments, &live.name_any()).await?;
        }
    }

    // 4. Adopt the preview set as live. The Deployment is addressed by
    // name since a parked Deployment may also carry the preview label
    // at this point
    let adopt = serde_json::json!({
        "metadata": {"labels": {LABEL_SERVICE_STATE: ServiceState::Live.as_str()}},
        "spec": {"replicas": dataplane.spec.deployment.replicas},
    });
    deployments
        .patch(&preview.name_any(), &PatchParams::default(), &Patch::Merge(&adopt))
        .await?;

    let relabel = serde_json::json!({
        "metadata": {"labels": {LABEL_SERVICE_STATE: ServiceState::Live.as_str()}},
    });
    let preview_admin = list_owned(
        &services,
        &uid,
        &owned_service_labels(
            MANAGED_BY_DATAPLANE,
            &name,
            ServiceState::Preview,
            ServiceKind::Admin,
        ),
    )
    .await?;
    for svc in &preview_admin {
        services
            .patch(&svc.name_any(), &PatchParams::default(), &Patch::Merge(&relabel))
            .await?;
    }
    let preview_secrets = list_owned(
        &secrets,
        &uid,
        &owned_labels(MANAGED_BY_DATAPLANE, &name, ServiceState::Preview),
    )
    .await?;
    for secret in &preview_secrets {
        secrets
            .patch(&secret.name_any(), &PatchParams::default(), &Patch::Merge(&relabel))
            .await?;
    }

    // 5. Consume the promotion gate. Cleared last: a crash anywhere
    // above leaves the gate open and the promotion re-runs
    if promotion_gate_open(dataplane) {
        clear_promotion_gate(ctx, dataplane).await?;
    }

    Ok(())
}

/// Housekeeping once live matches the target template: retire stale
/// preview leftovers, consume a dangling gate annotation, and record
/// the RolledOut condition.
async fn finish_rollout(
    ctx: &Context,
    dataplane: &DataPlane,
    target_hash: &str,
) -> Result<(), ReconcileError> {
    let plan = configured_plan(dataplane)?;
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = dataplane.name_any();
    let uid = dataplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    let previews = list_owned(
        &deployments,
        &uid,
        &owned_labels(MANAGED_BY_DATAPLANE, &name, ServiceState::Preview),
    )
    .await?;
    for dep in &previews {
        match plan {
            DeploymentRolloutPlan::ScaleDownOnPromotionScaleUpOnRollout => {
                let replicas = dep.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                if replicas != 0 {
                    let park = serde_json::json!({"spec": {"replicas": 0}});
                    deployments
                        .patch(&dep.name_any(), &PatchParams::default(), &Patch::Merge(&park))
                        .await?;
                }
            }
            DeploymentRolloutPlan::DeleteOnPromotionRecreateOnRollout => {
                delete_tolerant(&deployments, &dep.name_any()).await?;
            }
        }
    }

    // Preview Services and Secrets are never parked
    let preview_admin = list_owned(
        &services,
        &uid,
        &owned_service_labels(
            MANAGED_BY_DATAPLANE,
            &name,
            ServiceState::Preview,
            ServiceKind::Admin,
        ),
    )
    .await?;
    for svc in &preview_admin {
        delete_tolerant(&services, &svc.name_any()).await?;
    }
    let preview_secrets = list_owned(
        &secrets,
        &uid,
        &owned_labels(MANAGED_BY_DATAPLANE, &name, ServiceState::Preview),
    )
    .await?;
    for secret in &preview_secrets {
        delete_tolerant(&secrets, &secret.name_any()).await?;
    }

    if promotion_gate_open(dataplane) {
        clear_promotion_gate(ctx, dataplane).await?;
    }

    let current = dataplane.status.clone().unwrap_or_default();
    let mut updated = current.clone();
    set_condition(
        &mut updated,
        new_condition(
            CONDITION_TYPE_ROLLED_OUT,
            CONDITION_TRUE,
            "PromotionComplete",
            &format!("template generation {} is live", target_hash),
            dataplane.metadata.generation,
        ),
    );
    if dataplane::status_changed(&current, &updated) {
        dataplane::patch_status(ctx, dataplane, &updated).await?;
    }

    Ok(())
}

/// Publish the preview admin Service endpoint and rollout condition.
/// The status write is suppressed when nothing drifted.
async fn sync_rollout_status(
    ctx: &Context,
    dataplane: &DataPlane,
    preview_admin: &Service,
    preview_ready: bool,
) -> Result<(), ReconcileError> {
    let current = dataplane.status.clone().unwrap_or_default();
    let mut updated = current.clone();

    updated.rollout = Some(DataPlaneRolloutStatus {
        services: Some(RolloutStatusServices {
            admin_api: Some(RolloutStatusService {
                name: preview_admin.name_any(),
                addresses: service_addresses(preview_admin),
            }),
        }),
    });

    let (reason, message) = if preview_ready {
        ("AwaitingPromotion", "preview generation is ready and awaiting promotion")
    } else {
        ("PreviewProvisioning", "preview generation is rolling out")
    };
    set_condition(
        &mut updated,
        new_condition(
            CONDITION_TYPE_ROLLED_OUT,
            CONDITION_FALSE,
            reason,
            message,
            dataplane.metadata.generation,
        ),
    );

    if dataplane::status_changed(&current, &updated) {
        dataplane::patch_status(ctx, dataplane, &updated).await?;
    }

    Ok(())
}

/// Find the single live Deployment, reducing duplicates if more than
/// one matches.
async fn find_live_deployment(
    ctx: &Context,
    dataplane: &DataPlane,
) -> Result<Option<Deployment>, ReconcileError> {
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = dataplane.name_any();
    let uid = dataplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let mut candidates = list_owned(
        &api,
        &uid,
        &owned_labels(MANAGED_BY_DATAPLANE, &name, ServiceState::Live),
    )
    .await?;

    if candidates.len() > 1 {
        reduce_duplicates(&api, &candidates).await?;
        return Err(ReconcileError::DuplicatesReduced {
            kind: "Deployment",
            owner: name,
        });
    }

    Ok(candidates.pop())
}

async fn clear_promotion_gate(ctx: &Context, dataplane: &DataPlane) -> Result<(), ReconcileError> {
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let api: Api<DataPlane> = Api::namespaced(ctx.client.clone(), &namespace);

    let patch = serde_json::json!({
        "metadata": {"annotations": {ANNOTATION_PROMOTE_WHEN_READY: null}},
    });
    api.patch(
        &dataplane.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;

    Ok(())
}

async fn delete_tolerant<K>(api: &Api<K>, name: &str) -> Result<(), kube::Error>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "rollout_test.rs"]
mod tests;
