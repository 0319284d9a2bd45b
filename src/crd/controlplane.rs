use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, DeploymentOptions};

/// ControlPlane is the desired state of a gateway control-plane workload.
///
/// The operator keeps a single Deployment converged with this spec and
/// points it at the referenced DataPlane's admin API.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "portti.io",
    version = "v1alpha1",
    kind = "ControlPlane",
    namespaced,
    status = "ControlPlaneStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.deployment.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneSpec {
    /// Workload options for the control-plane Deployment
    pub deployment: DeploymentOptions,

    /// Name of the DataPlane (same namespace) this control plane configures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataplane: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneStatus {
    /// Latest observations of the control-plane's state, unique by type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
