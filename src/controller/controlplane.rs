//! ControlPlane reconciler
//!
//! A ControlPlane owns a single Deployment running the configuration
//! controller, pointed at the referenced DataPlane's admin API. There
//! is no rollout machinery here: the Deployment is patched in place.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::compare::{enforce_labels, pod_templates_equal};
use super::conditions::{
    new_condition, set_condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_TYPE_READY,
};
use super::labels::{
    owned_labels, owned_service_labels, ServiceKind, ServiceState, LABEL_APP, LABEL_MANAGED_BY,
    LABEL_SERVICE_STATE, MANAGED_BY_CONTROLPLANE, MANAGED_BY_DATAPLANE,
};
use super::owners::list_owned;
use super::resources::service::ADMIN_PORT;
use super::resources::{ensure_owned, UpdateDecision};
use super::{
    conditions, owner_reference, Context, ReconcileError, CONVERGING_REQUEUE, DEFAULT_REQUEUE,
};
use crate::crd::controlplane::ControlPlane;
use crate::crd::dataplane::DataPlane;

/// Image used when the spec names neither an image nor a pod template
pub const DEFAULT_IMAGE: &str = "kong/kubernetes-ingress-controller:3.2";

/// Name of the synthesized controller container
pub const CONTROLLER_CONTAINER: &str = "controller";

/// Environment variable carrying the admin API URL into the pod
pub const ADMIN_URL_ENV: &str = "CONTROLLER_KONG_ADMIN_URL";

/// Reconcile one ControlPlane.
pub async fn reconcile(
    controlplane: Arc<ControlPlane>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = controlplane.name_any();
    let namespace = controlplane.namespace().unwrap_or_default();
    let started = Instant::now();

    info!(controlplane = %name, namespace = %namespace, "Reconciling ControlPlane");

    let result = reconcile_inner(&controlplane, &ctx).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(action) => {
            ctx.metrics
                .record_reconciliation_success("controlplane", elapsed);
            Ok(action)
        }
        Err(e) if e.is_conflict() => {
            debug!(controlplane = %name, "Write conflict, requeueing immediately");
            ctx.metrics
                .record_reconciliation_conflict("controlplane", elapsed);
            Ok(Action::requeue(Duration::ZERO))
        }
        Err(e) => {
            ctx.metrics
                .record_reconciliation_error("controlplane", elapsed);
            Err(e)
        }
    }
}

async fn reconcile_inner(
    controlplane: &ControlPlane,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    let name = controlplane.name_any();
    let namespace = controlplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let uid = controlplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    // The controller cannot do anything useful until the referenced
    // DataPlane's admin API is discoverable
    let admin_url = resolve_admin_api_url(ctx, controlplane).await?;
    if controlplane.spec.dataplane.is_some() && admin_url.is_none() {
        patch_ready_condition(
            ctx,
            controlplane,
            CONDITION_FALSE,
            "DataPlaneNotReady",
            "referenced DataPlane has no admin Service yet",
        )
        .await?;
        return Ok(Action::requeue(CONVERGING_REQUEUE));
    }

    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let generated = build_deployment(controlplane, admin_url.as_deref())?;
    let selector_labels = owned_labels(MANAGED_BY_CONTROLPLANE, &name, ServiceState::Live);
    let enforced_labels = selector_labels.clone();
    let replicas = controlplane.spec.deployment.replicas;

    let (outcome, deployment) = ensure_owned(
        &api,
        "Deployment",
        &name,
        &uid,
        &selector_labels,
        generated.clone(),
        move |existing, generated| {
            let mut updated = existing.clone();
            enforce_labels(&mut updated.metadata, &enforced_labels);

            let generated_spec = generated.spec.clone().unwrap_or_default();
            let spec = updated.spec.get_or_insert_with(Default::default);
            spec.replicas = Some(replicas);
            if !pod_templates_equal(&spec.template, &generated_spec.template) {
                spec.template = generated_spec.template;
            }

            UpdateDecision::Patch(Box::new(updated))
        },
    )
    .await?;

    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    let desired = controlplane.spec.deployment.replicas;

    if available >= desired {
        patch_ready_condition(
            ctx,
            controlplane,
            CONDITION_TRUE,
            "DeploymentAvailable",
            "all desired replicas are available",
        )
        .await?;
    } else {
        patch_ready_condition(
            ctx,
            controlplane,
            CONDITION_FALSE,
            "DeploymentNotAvailable",
            &format!("{}/{} replicas available", available, desired),
        )
        .await?;
    }

    if outcome.changed() {
        Ok(Action::requeue(CONVERGING_REQUEUE))
    } else {
        Ok(Action::requeue(DEFAULT_REQUEUE))
    }
}

/// Resolve the referenced DataPlane's live admin Service into an
/// in-cluster URL. `Ok(None)` means the reference is absent or the
/// Service does not exist yet; a missing DataPlane object is an error
/// so the retry backoff applies.
async fn resolve_admin_api_url(
    ctx: &Context,
    controlplane: &ControlPlane,
) -> Result<Option<String>, ReconcileError> {
    let Some(dataplane_name) = controlplane.spec.dataplane.as_deref() else {
        return Ok(None);
    };
    let namespace = controlplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;

    let dataplanes: Api<DataPlane> = Api::namespaced(ctx.client.clone(), &namespace);
    let dataplane = dataplanes.get(dataplane_name).await?;
    let Some(dataplane_uid) = dataplane.meta().uid.clone() else {
        return Ok(None);
    };

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    let admin = list_owned(
        &services,
        &dataplane_uid,
        &owned_service_labels(
            MANAGED_BY_DATAPLANE,
            dataplane_name,
            ServiceState::Live,
            ServiceKind::Admin,
        ),
    )
    .await?;

    Ok(admin.first().map(|svc| {
        format!(
            "https://{}.{}.svc:{}",
            svc.name_any(),
            namespace,
            ADMIN_PORT
        )
    }))
}

/// Generate the Deployment for a ControlPlane.
fn build_deployment(
    controlplane: &ControlPlane,
    admin_url: Option<&str>,
) -> Result<Deployment, ReconcileError> {
    let name = controlplane.name_any();

    let mut pod_labels = BTreeMap::new();
    pod_labels.insert(LABEL_APP.to_string(), name.clone());
    pod_labels.insert(
        LABEL_MANAGED_BY.to_string(),
        MANAGED_BY_CONTROLPLANE.to_string(),
    );
    pod_labels.insert(
        LABEL_SERVICE_STATE.to_string(),
        ServiceState::Live.as_str().to_string(),
    );

    let mut template = base_pod_template(controlplane);
    let template_meta = template.metadata.get_or_insert_with(Default::default);
    let labels = template_meta.labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in &pod_labels {
        labels.insert(key.clone(), value.clone());
    }

    if let Some(url) = admin_url {
        inject_admin_url(&mut template, url);
    }

    Ok(Deployment {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", name)),
            namespace: controlplane.namespace(),
            labels: Some(owned_labels(
                MANAGED_BY_CONTROLPLANE,
                &name,
                ServiceState::Live,
            )),
            owner_references: Some(vec![owner_reference(controlplane)?]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(controlplane.spec.deployment.replicas),
            selector: LabelSelector {
                match_labels: Some(pod_labels),
                ..Default::default()
            },
            template,
            ..Default::default()
        }),
        status: None,
    })
}

fn base_pod_template(controlplane: &ControlPlane) -> PodTemplateSpec {
    if let Some(template) = &controlplane.spec.deployment.pod_template_spec {
        return template.clone();
    }

    let image = controlplane
        .spec
        .deployment
        .image
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

    PodTemplateSpec {
        metadata: Some(ObjectMeta::default()),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTROLLER_CONTAINER.to_string(),
                image: Some(image),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

/// Set the admin URL env var on every container, replacing an existing
/// entry of the same name.
fn inject_admin_url(template: &mut PodTemplateSpec, url: &str) {
    let Some(spec) = template.spec.as_mut() else {
        return;
    };
    for container in &mut spec.containers {
        let env = container.env.get_or_insert_with(Vec::new);
        env.retain(|var| var.name != ADMIN_URL_ENV);
        env.push(EnvVar {
            name: ADMIN_URL_ENV.to_string(),
            value: Some(url.to_string()),
            value_from: None,
        });
    }
}

/// Patch the Ready condition, suppressed when nothing drifted.
async fn patch_ready_condition(
    ctx: &Context,
    controlplane: &ControlPlane,
    status: &str,
    reason: &str,
    message: &str,
) -> Result<(), ReconcileError> {
    let current = controlplane.status.clone().unwrap_or_default();
    let mut updated = current.clone();
    set_condition(
        &mut updated,
        new_condition(
            CONDITION_TYPE_READY,
            status,
            reason,
            message,
            controlplane.metadata.generation,
        ),
    );

    if !conditions::needs_status_update(&current.conditions, &updated.conditions) {
        return Ok(());
    }

    let namespace = controlplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let api: Api<ControlPlane> = Api::namespaced(ctx.client.clone(), &namespace);
    api.patch_status(
        &controlplane.name_any(),
        &kube::api::PatchParams::default(),
        &kube::api::Patch::Merge(serde_json::json!({ "status": updated })),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
#[path = "controlplane_test.rs"]
mod tests;
