use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Address, Condition, DeploymentOptions};

/// DataPlane is the desired state of a gateway data-plane workload.
///
/// The operator keeps a Deployment, an admin Service, a proxy Service
/// and a TLS Secret converged with this spec, and optionally runs a
/// Blue-Green rollout across two generations of those children.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "portti.io",
    version = "v1alpha1",
    kind = "DataPlane",
    namespaced,
    status = "DataPlaneStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.deployment.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneSpec {
    /// Workload options for the data-plane Deployment
    pub deployment: DeploymentOptions,

    /// Service exposure options
    #[serde(default)]
    pub network: NetworkOptions,

    /// Optional rollout policy; absent means plain in-place reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<Rollout>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOptions {
    #[serde(default)]
    pub services: ServicesOptions,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicesOptions {
    /// Admin API service options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminServiceOptions>,

    /// Proxy (ingress traffic) service options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyServiceOptions>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminServiceOptions {
    /// Extra annotations stamped onto the admin Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Name of an existing TLS secret whose material is copied into the
    /// per-generation admin mTLS secret owned by the operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_secret: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServiceOptions {
    /// Service type: "LoadBalancer" (default) or "ClusterIP"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    /// Extra annotations stamped onto the proxy Service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Rollout policy for the data-plane's owned resources
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    pub strategy: RolloutStrategy,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    /// Blue-Green: provision a full preview generation next to the live
    /// one and switch over on promotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_green: Option<BlueGreenStrategy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlueGreenStrategy {
    pub promotion: Promotion,

    /// How owned resources are handled across promotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<RolloutResources>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    /// "AutomaticPromotion" or "BreakBeforePromotion".
    ///
    /// Kept as a string at the API boundary; decoded into
    /// `controller::rollout::PromotionStrategy` on read so an unknown
    /// value surfaces as a typed configuration error.
    #[serde(default = "default_promotion_strategy")]
    pub strategy: String,
}

fn default_promotion_strategy() -> String {
    "BreakBeforePromotion".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<RolloutResourcePlan>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutResourcePlan {
    /// "ScaleDownOnPromotionScaleUpOnRollout" (default) or
    /// "DeleteOnPromotionRecreateOnRollout"; decoded into
    /// `controller::rollout::DeploymentRolloutPlan` on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
}

/// Status of a DataPlane
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneStatus {
    /// Latest observations of the data-plane's state, unique by type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Addresses at which the live proxy Service accepts traffic
    #[serde(default)]
    pub addresses: Vec<Address>,

    /// Ready pods behind the live Deployment
    #[serde(default)]
    pub ready_replicas: i32,

    /// Populated only while a Blue-Green rollout is in progress or completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<DataPlaneRolloutStatus>,
}

/// Rollout progress published for downstream config consumers
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneRolloutStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<RolloutStatusServices>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatusServices {
    /// The preview generation's admin API Service
    #[serde(rename = "adminAPI", skip_serializing_if = "Option::is_none")]
    pub admin_api: Option<RolloutStatusService>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatusService {
    pub name: String,

    #[serde(default)]
    pub addresses: Vec<Address>,
}

#[cfg(test)]
#[path = "dataplane_test.rs"]
mod tests;
