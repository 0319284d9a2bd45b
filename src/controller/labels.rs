//! Label and annotation axis for owned resources
//!
//! Every child object the operator creates carries the managed-by label
//! plus, depending on kind, a service-type and service-state label. The
//! stringly label values live only at the Kubernetes serialization
//! boundary; inside the controller they are the typed enums below.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marks an object as owned by a portti controller; value is the
/// managing component ("dataplane" or "controlplane").
pub const LABEL_MANAGED_BY: &str = "portti.io/managed-by";

/// Distinguishes the admin API Service from the proxy Service.
pub const LABEL_SERVICE_TYPE: &str = "portti.io/service-type";

/// Distinguishes the live generation from the preview generation.
pub const LABEL_SERVICE_STATE: &str = "portti.io/service-state";

/// Ties children (and their pods) back to the managed resource name.
pub const LABEL_APP: &str = "app";

/// Revision label for the generated pod template, also used to detect
/// whether the live generation matches the current spec.
pub const LABEL_TEMPLATE_HASH: &str = "pod-template-hash";

/// Promotion gate: a BreakBeforePromotion rollout proceeds only while
/// this annotation is present with the value "true".
pub const ANNOTATION_PROMOTE_WHEN_READY: &str = "portti.io/promote-when-ready";

pub const MANAGED_BY_DATAPLANE: &str = "dataplane";
pub const MANAGED_BY_CONTROLPLANE: &str = "controlplane";

/// Which generation an owned resource belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Live,
    Preview,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Live => "live",
            ServiceState::Preview => "preview",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "live" => Some(ServiceState::Live),
            "preview" => Some(ServiceState::Preview),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which role a Service plays for the data plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Admin,
    Proxy,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Admin => "admin",
            ServiceKind::Proxy => "proxy",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base label set owned by the operator for a managed resource's children.
///
/// This is both what gets stamped onto generated objects and what the
/// owner index lists by.
pub fn owned_labels(managed_by: &str, app: &str, state: ServiceState) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), managed_by.to_string());
    labels.insert(LABEL_APP.to_string(), app.to_string());
    labels.insert(LABEL_SERVICE_STATE.to_string(), state.as_str().to_string());
    labels
}

/// `owned_labels` plus the service-type axis, for Service children.
pub fn owned_service_labels(
    managed_by: &str,
    app: &str,
    state: ServiceState,
    kind: ServiceKind,
) -> BTreeMap<String, String> {
    let mut labels = owned_labels(managed_by, app, state);
    labels.insert(LABEL_SERVICE_TYPE.to_string(), kind.as_str().to_string());
    labels
}

/// Render a label map as a Kubernetes list selector ("k=v,k=v").
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute a stable 10-character hash for a PodTemplateSpec.
///
/// Serializes the template to JSON (deterministic field order) and
/// hashes the bytes, like the upstream pod-template-hash label.
/// `DefaultHasher::new()` uses fixed keys, so the value is stable
/// across processes.
pub fn template_hash(template: &PodTemplateSpec) -> String {
    let json = serde_json::to_string(template).expect("PodTemplateSpec serialization is infallible");

    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);

    short_hash(hasher.finish())
}

/// First ten hex digits of the hash, zero-padded so small values still
/// yield a full-width label.
fn short_hash(hash: u64) -> String {
    format!("{:016x}", hash)[..10].to_string()
}
