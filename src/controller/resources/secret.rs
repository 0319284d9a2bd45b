//! Ensure operation for the per-generation admin mTLS Secret
//!
//! Certificate material is copied from the secret referenced by
//! `spec.network.services.admin.certificateSecret`; the operator does
//! not mint certificates itself. Without a reference, an empty Opaque
//! secret is created for the user to populate, and populated data is
//! never clobbered on reconcile - only labels, type and ownership are
//! enforced.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Api, Resource, ResourceExt};
use std::collections::BTreeMap;

use crate::controller::compare::enforce_labels;
use crate::controller::labels::{owned_labels, ServiceState, MANAGED_BY_DATAPLANE};
use crate::controller::resources::{ensure_owned, EnsureOutcome, UpdateDecision};
use crate::controller::{owner_reference, Context, ReconcileError};
use crate::crd::dataplane::DataPlane;

/// Ensure exactly one TLS Secret exists for the given generation.
pub async fn ensure_tls_secret(
    ctx: &Context,
    dataplane: &DataPlane,
    state: ServiceState,
) -> Result<(EnsureOutcome, Secret), ReconcileError> {
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = dataplane.name_any();
    let uid = dataplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    // Resolve the source material before listing; a missing referenced
    // secret is a real error (the spec points at something absent) and
    // gets the controller's normal retry backoff.
    let source = match certificate_secret_name(dataplane) {
        Some(source_name) => {
            let source = api.get(source_name).await?;
            Some((source.type_.clone(), source.data.clone()))
        }
        None => None,
    };

    let generated = build_tls_secret(dataplane, state, source.clone())?;
    let discovery = owned_labels(MANAGED_BY_DATAPLANE, &name, state);

    ensure_owned(
        &api,
        "Secret",
        &name,
        &uid,
        &discovery,
        generated,
        move |existing, generated| {
            let mut updated = existing.clone();
            if let Some(labels) = generated.metadata.labels.as_ref() {
                enforce_labels(&mut updated.metadata, labels);
            }

            // Only converge data towards an explicit source; data the
            // user placed into an unmanaged-source secret stays as is
            if let Some((source_type, source_data)) = &source {
                updated.type_ = source_type.clone();
                if updated.data != *source_data {
                    updated.data = source_data.clone();
                }
            }

            UpdateDecision::Patch(Box::new(updated))
        },
    )
    .await
}

/// Generate the admin mTLS Secret for a generation.
pub fn build_tls_secret(
    dataplane: &DataPlane,
    state: ServiceState,
    source: Option<(Option<String>, Option<BTreeMap<String, ByteString>>)>,
) -> Result<Secret, ReconcileError> {
    let name = dataplane.name_any();

    let (type_, data) = match source {
        Some((source_type, source_data)) => (
            source_type.or_else(|| Some("kubernetes.io/tls".to_string())),
            source_data,
        ),
        None => (Some("Opaque".to_string()), None),
    };

    Ok(Secret {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-admin-cert-", name)),
            namespace: dataplane.namespace(),
            labels: Some(owned_labels(MANAGED_BY_DATAPLANE, &name, state)),
            owner_references: Some(vec![owner_reference(dataplane)?]),
            ..Default::default()
        },
        type_,
        data,
        ..Default::default()
    })
}

fn certificate_secret_name(dataplane: &DataPlane) -> Option<&str> {
    dataplane
        .spec
        .network
        .services
        .admin
        .as_ref()
        .and_then(|admin| admin.certificate_secret.as_deref())
}

#[cfg(test)]
#[path = "secret_test.rs"]
mod tests;
