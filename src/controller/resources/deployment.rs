//! Ensure operation for the data-plane Deployment
//!
//! Each template generation is its own Deployment object when a rollout
//! strategy is configured: the pod selector carries the template hash,
//! which is immutable, so live/preview membership lives only in the
//! object's metadata labels where promotion can re-label it. Without a
//! rollout strategy there is a single in-place-updated Deployment whose
//! selector pins the (never flipped) live state instead.

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Api, Resource, ResourceExt};
use std::collections::BTreeMap;

use crate::controller::compare::{enforce_labels, pod_templates_equal};
use crate::controller::labels::{
    owned_labels, template_hash, ServiceState, LABEL_APP, LABEL_MANAGED_BY, LABEL_SERVICE_STATE,
    LABEL_TEMPLATE_HASH, MANAGED_BY_DATAPLANE,
};
use crate::controller::resources::{ensure_owned, EnsureOutcome, UpdateDecision};
use crate::controller::{owner_reference, Context, ReconcileError};
use crate::crd::dataplane::DataPlane;

/// Image used when the spec names neither an image nor a pod template
pub const DEFAULT_IMAGE: &str = "kong:3.6";

/// Name of the synthesized proxy container
pub const PROXY_CONTAINER: &str = "proxy";

/// Ensure exactly one Deployment exists for the given generation.
pub async fn ensure_deployment(
    ctx: &Context,
    dataplane: &DataPlane,
    state: ServiceState,
) -> Result<(EnsureOutcome, Deployment), ReconcileError> {
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

    let generated = build_deployment(dataplane, state)?;
    let selector_labels = owned_labels(MANAGED_BY_DATAPLANE, &name, state);
    let mut stamped_labels = selector_labels.clone();
    stamped_labels.insert(
        LABEL_TEMPLATE_HASH.to_string(),
        target_template_hash(dataplane),
    );
    let replicas = dataplane.spec.deployment.replicas;

    ensure_owned(
        &api,
        "Deployment",
        &name,
        &uid,
        &selector_labels,
        generated.clone(),
        move |existing, generated| {
            // The pod selector is immutable: a drifted generation hash,
            // or a label-scheme change when the rollout strategy is
            // toggled, can only converge through replacement.
            if selector_drifted(existing, generated) {
                return UpdateDecision::Recreate;
            }

            let mut updated = existing.clone();
            enforce_labels(&mut updated.metadata, &stamped_labels);

            let generated_spec = generated.spec.clone().unwrap_or_default();
            let spec = updated.spec.get_or_insert_with(Default::default);
            spec.replicas = Some(replicas);
            spec.strategy = generated_spec.strategy;
            if !pod_templates_equal(&spec.template, &generated_spec.template) {
                spec.template = generated_spec.template;
            }
            // Selector is immutable and left untouched

            UpdateDecision::Patch(Box::new(updated))
        },
    )
    .await
}

/// Whether the existing Deployment's pod selector no longer matches
/// the generated one. True under a rollout strategy when the template
/// hash moved, and in either direction when toggling a strategy swaps
/// the selector between the state-pinned and hash-keyed schemes.
fn selector_drifted(existing: &Deployment, generated: &Deployment) -> bool {
    let existing_selector = existing
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref());
    let generated_selector = generated
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref());

    existing_selector != generated_selector
}

/// Generate the Deployment for a DataPlane generation.
///
/// Deterministic: the same spec yields the same object modulo the
/// server-assigned name (children use generateName).
pub fn build_deployment(
    dataplane: &DataPlane,
    state: ServiceState,
) -> Result<Deployment, ReconcileError> {
    let name = dataplane.name_any();
    let hash = target_template_hash(dataplane);

    let pod_labels = pod_selector_labels(dataplane, state);
    let mut template = base_pod_template(dataplane);
    let template_meta = template.metadata.get_or_insert_with(Default::default);
    let labels = template_meta.labels.get_or_insert_with(BTreeMap::new);
    for (key, value) in &pod_labels {
        labels.insert(key.clone(), value.clone());
    }

    let mut metadata_labels = owned_labels(MANAGED_BY_DATAPLANE, &name, state);
    metadata_labels.insert(LABEL_TEMPLATE_HASH.to_string(), hash);

    Ok(Deployment {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", name)),
            namespace: dataplane.namespace(),
            labels: Some(metadata_labels),
            owner_references: Some(vec![owner_reference(dataplane)?]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(dataplane.spec.deployment.replicas),
            selector: LabelSelector {
                match_labels: Some(pod_labels),
                ..Default::default()
            },
            template,
            strategy: Some(default_rollout_strategy()),
            ..Default::default()
        }),
        status: None,
    })
}

/// Fixed update policy for generated Deployments: surge one pod, never
/// drop below the desired count.
pub fn default_rollout_strategy() -> DeploymentStrategy {
    DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDeployment {
            max_surge: Some(IntOrString::Int(1)),
            max_unavailable: Some(IntOrString::Int(0)),
        }),
    }
}

/// Hash identifying the generation the current spec asks for.
pub fn target_template_hash(dataplane: &DataPlane) -> String {
    template_hash(&base_pod_template(dataplane))
}

/// The spec-derived pod template before any operator labels are added.
///
/// The hash is computed over this base so stamping labels (which embed
/// the hash itself) cannot perturb it.
fn base_pod_template(dataplane: &DataPlane) -> PodTemplateSpec {
    if let Some(template) = &dataplane.spec.deployment.pod_template_spec {
        return template.clone();
    }

    let image = dataplane
        .spec
        .deployment
        .image
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE.to_string());

    PodTemplateSpec {
        metadata: Some(ObjectMeta::default()),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: PROXY_CONTAINER.to_string(),
                image: Some(image),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

/// Labels the Deployment selects its pods by.
///
/// Rollout mode keys on the template hash so two generations coexist;
/// standard mode pins the live state, which is never re-labeled.
pub fn pod_selector_labels(
    dataplane: &DataPlane,
    state: ServiceState,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), dataplane.name_any());
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        MANAGED_BY_DATAPLANE.to_string(),
    );

    if dataplane.spec.rollout.is_some() {
        labels.insert(
            LABEL_TEMPLATE_HASH.to_string(),
            target_template_hash(dataplane),
        );
    } else {
        labels.insert(
            LABEL_SERVICE_STATE.to_string(),
            state.as_str().to_string(),
        );
    }

    labels
}

#[cfg(test)]
#[path = "deployment_test.rs"]
mod tests;
