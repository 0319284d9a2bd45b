//! Custom resource definitions for the portti operator
//!
//! Two managed resources share the shapes in this module:
//! - `DataPlane` - a gateway data-plane workload (Deployment + Services + TLS Secret)
//! - `ControlPlane` - the control-plane workload configuring a data-plane

pub mod controlplane;
pub mod dataplane;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition documents one observation of a managed resource's state.
///
/// Unique by `type` within a status; the condition manager in
/// `controller::conditions` enforces uniqueness and the list cap.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. "Ready")
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason for the last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Generation of the spec this condition was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// RFC3339 timestamp of the last status transition
    pub last_transition_time: String,
}

/// An address at which a managed workload is reachable
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// "IPAddress" or "Hostname"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,

    /// The address value
    pub value: String,
}

impl Address {
    pub fn ip(value: impl Into<String>) -> Self {
        Address {
            address_type: Some("IPAddress".to_string()),
            value: value.into(),
        }
    }

    pub fn hostname(value: impl Into<String>) -> Self {
        Address {
            address_type: Some("Hostname".to_string()),
            value: value.into(),
        }
    }
}

/// Deployment-shaped options shared by DataPlane and ControlPlane specs
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    /// Number of desired pods
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Container image; ignored when a full pod template is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Full pod template override
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "any_object")]
    pub pod_template_spec: Option<PodTemplateSpec>,
}

fn default_replicas() -> i32 {
    1
}

/// Schema escape hatch for embedded upstream Kubernetes types.
///
/// `PodTemplateSpec` does not derive JsonSchema; expose it as an opaque
/// object with x-kubernetes-preserve-unknown-fields so the API server
/// keeps every field.
pub(crate) fn any_object(_gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
