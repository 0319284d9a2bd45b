//! Ensure operations for the admin and proxy Services
//!
//! The admin Service exposes the data-plane's administrative API to the
//! control plane (one per generation during a rollout); the proxy
//! Service carries ingress traffic and only ever points at the live
//! generation - flipping its pod selector is the promotion cutover.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Api, Resource, ResourceExt};
use std::collections::BTreeMap;

use crate::controller::compare::{enforce_annotations, enforce_labels};
use crate::controller::labels::{
    owned_service_labels, ServiceKind, ServiceState, MANAGED_BY_DATAPLANE,
};
use crate::controller::resources::{ensure_owned, EnsureOutcome, UpdateDecision};
use crate::controller::{owner_reference, Context, ReconcileError};
use crate::crd::dataplane::DataPlane;
use crate::crd::Address;

/// Port the admin API listens on inside the pod
pub const ADMIN_PORT: i32 = 8444;

/// Proxy listener ports (HTTP and TLS)
pub const PROXY_HTTP_PORT: i32 = 80;
pub const PROXY_HTTP_TARGET: i32 = 8000;
pub const PROXY_HTTPS_PORT: i32 = 443;
pub const PROXY_HTTPS_TARGET: i32 = 8443;

/// Ensure exactly one admin Service exists for the given generation,
/// selecting pods by `pod_selector`.
pub async fn ensure_admin_service(
    ctx: &Context,
    dataplane: &DataPlane,
    state: ServiceState,
    pod_selector: &BTreeMap<String, String>,
) -> Result<(EnsureOutcome, Service), ReconcileError> {
    ensure_service(
        ctx,
        dataplane,
        state,
        ServiceKind::Admin,
        build_admin_service(dataplane, state, pod_selector)?,
    )
    .await
}

/// Ensure exactly one proxy Service exists (live generation only).
pub async fn ensure_proxy_service(
    ctx: &Context,
    dataplane: &DataPlane,
    pod_selector: &BTreeMap<String, String>,
) -> Result<(EnsureOutcome, Service), ReconcileError> {
    ensure_service(
        ctx,
        dataplane,
        ServiceState::Live,
        ServiceKind::Proxy,
        build_proxy_service(dataplane, pod_selector)?,
    )
    .await
}

async fn ensure_service(
    ctx: &Context,
    dataplane: &DataPlane,
    state: ServiceState,
    kind: ServiceKind,
    generated: Service,
) -> Result<(EnsureOutcome, Service), ReconcileError> {
    let namespace = dataplane
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = dataplane.name_any();
    let uid = dataplane
        .meta()
        .uid
        .clone()
        .ok_or(ReconcileError::MissingUid)?;

    let api: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    let discovery = owned_service_labels(MANAGED_BY_DATAPLANE, &name, state, kind);

    ensure_owned(
        &api,
        "Service",
        &name,
        &uid,
        &discovery,
        generated.clone(),
        move |existing, generated| {
            let mut updated = existing.clone();
            if let Some(labels) = generated.metadata.labels.as_ref() {
                enforce_labels(&mut updated.metadata, labels);
            }
            if let Some(annotations) = generated.metadata.annotations.as_ref() {
                enforce_annotations(&mut updated.metadata, annotations);
            }

            let generated_spec = generated.spec.clone().unwrap_or_default();
            let spec = updated.spec.get_or_insert_with(Default::default);
            spec.type_ = generated_spec.type_;
            spec.selector = generated_spec.selector;
            spec.ports = merge_ports(spec.ports.take(), generated_spec.ports);
            // clusterIP and other server-assigned fields ride along
            // from the existing object untouched

            UpdateDecision::Patch(Box::new(updated))
        },
    )
    .await
}

/// Desired ports, but with server-assigned nodePorts carried over from
/// the existing object (matched by port name) so a generated object
/// does not look perpetually drifted.
fn merge_ports(
    existing: Option<Vec<ServicePort>>,
    desired: Option<Vec<ServicePort>>,
) -> Option<Vec<ServicePort>> {
    let existing = existing.unwrap_or_default();
    let mut desired = desired?;

    for port in &mut desired {
        if port.node_port.is_none() {
            port.node_port = existing
                .iter()
                .find(|e| e.name == port.name)
                .and_then(|e| e.node_port);
        }
    }

    Some(desired)
}

/// Generate the admin API Service for a generation.
pub fn build_admin_service(
    dataplane: &DataPlane,
    state: ServiceState,
    pod_selector: &BTreeMap<String, String>,
) -> Result<Service, ReconcileError> {
    let name = dataplane.name_any();
    let options = dataplane.spec.network.services.admin.as_ref();

    Ok(Service {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-admin-", name)),
            namespace: dataplane.namespace(),
            labels: Some(owned_service_labels(
                MANAGED_BY_DATAPLANE,
                &name,
                state,
                ServiceKind::Admin,
            )),
            annotations: options.and_then(|o| o.annotations.clone()),
            owner_references: Some(vec![owner_reference(dataplane)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(pod_selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some("admin".to_string()),
                port: ADMIN_PORT,
                target_port: Some(IntOrString::Int(ADMIN_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Generate the proxy Service (live generation only).
pub fn build_proxy_service(
    dataplane: &DataPlane,
    pod_selector: &BTreeMap<String, String>,
) -> Result<Service, ReconcileError> {
    let name = dataplane.name_any();
    let options = dataplane.spec.network.services.proxy.as_ref();

    let service_type = options
        .and_then(|o| o.service_type.clone())
        .unwrap_or_else(|| "LoadBalancer".to_string());

    Ok(Service {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-proxy-", name)),
            namespace: dataplane.namespace(),
            labels: Some(owned_service_labels(
                MANAGED_BY_DATAPLANE,
                &name,
                ServiceState::Live,
                ServiceKind::Proxy,
            )),
            annotations: options.and_then(|o| o.annotations.clone()),
            owner_references: Some(vec![owner_reference(dataplane)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type),
            selector: Some(pod_selector.clone()),
            ports: Some(vec![
                ServicePort {
                    name: Some("http".to_string()),
                    port: PROXY_HTTP_PORT,
                    target_port: Some(IntOrString::Int(PROXY_HTTP_TARGET)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("https".to_string()),
                    port: PROXY_HTTPS_PORT,
                    target_port: Some(IntOrString::Int(PROXY_HTTPS_TARGET)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        status: None,
    })
}

/// Addresses a Service is reachable at: load-balancer ingress entries
/// when present, else the cluster IP.
pub fn service_addresses(service: &Service) -> Vec<Address> {
    let mut addresses = Vec::new();

    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref());

    if let Some(entries) = ingress {
        for entry in entries {
            if let Some(ip) = &entry.ip {
                addresses.push(Address::ip(ip));
            }
            if let Some(hostname) = &entry.hostname {
                addresses.push(Address::hostname(hostname));
            }
        }
    }

    if addresses.is_empty() {
        if let Some(cluster_ip) = service.spec.as_ref().and_then(|s| s.cluster_ip.as_ref()) {
            if !cluster_ip.is_empty() && cluster_ip != "None" {
                addresses.push(Address::ip(cluster_ip));
            }
        }
    }

    addresses
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
