#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity
#![allow(clippy::expect_used)] // Tests can use expect for better error messages

use super::*;
use kube::CustomResourceExt;

#[test]
fn test_dataplane_deserialize_from_yaml() {
    let yaml = r#"
apiVersion: portti.io/v1alpha1
kind: DataPlane
metadata:
  name: test-dataplane
spec:
  deployment:
    replicas: 3
    image: kong:3.6
  network:
    services:
      proxy:
        serviceType: LoadBalancer
        annotations:
          example.com/lb-class: internal
  rollout:
    strategy:
      blueGreen:
        promotion:
          strategy: BreakBeforePromotion
        resources:
          plan:
            deployment: ScaleDownOnPromotionScaleUpOnRollout
"#;

    let dataplane: DataPlane = serde_yaml::from_str(yaml).expect("Failed to deserialize DataPlane");

    assert_eq!(dataplane.metadata.name.as_deref(), Some("test-dataplane"));
    assert_eq!(dataplane.spec.deployment.replicas, 3);
    assert_eq!(dataplane.spec.deployment.image.as_deref(), Some("kong:3.6"));

    let proxy = dataplane.spec.network.services.proxy.unwrap();
    assert_eq!(proxy.service_type.as_deref(), Some("LoadBalancer"));

    let blue_green = dataplane.spec.rollout.unwrap().strategy.blue_green.unwrap();
    assert_eq!(blue_green.promotion.strategy, "BreakBeforePromotion");
    assert_eq!(
        blue_green.resources.unwrap().plan.unwrap().deployment.as_deref(),
        Some("ScaleDownOnPromotionScaleUpOnRollout")
    );
}

#[test]
fn test_dataplane_minimal_spec_defaults() {
    let yaml = r#"
apiVersion: portti.io/v1alpha1
kind: DataPlane
metadata:
  name: minimal
spec:
  deployment: {}
"#;

    let dataplane: DataPlane = serde_yaml::from_str(yaml).expect("Failed to deserialize DataPlane");

    // Replicas default to 1, network and rollout are optional
    assert_eq!(dataplane.spec.deployment.replicas, 1);
    assert!(dataplane.spec.network.services.admin.is_none());
    assert!(dataplane.spec.network.services.proxy.is_none());
    assert!(dataplane.spec.rollout.is_none());
}

#[test]
fn test_promotion_strategy_defaults_to_break_before() {
    let yaml = r#"
apiVersion: portti.io/v1alpha1
kind: DataPlane
metadata:
  name: gated
spec:
  deployment: {}
  rollout:
    strategy:
      blueGreen:
        promotion: {}
"#;

    let dataplane: DataPlane = serde_yaml::from_str(yaml).expect("Failed to deserialize DataPlane");
    let blue_green = dataplane.spec.rollout.unwrap().strategy.blue_green.unwrap();

    // Break-before is the safe default: nothing is promoted without the gate
    assert_eq!(blue_green.promotion.strategy, "BreakBeforePromotion");
}

#[test]
fn test_dataplane_crd_generation() {
    let crd = DataPlane::crd();

    assert_eq!(crd.spec.group, "portti.io");
    assert_eq!(crd.spec.names.kind, "DataPlane");
    assert_eq!(crd.spec.names.plural, "dataplanes");

    let version = &crd.spec.versions[0];
    assert_eq!(version.name, "v1alpha1");
    // Status is served as a subresource so spec owners and this engine
    // never contend on the same write path
    assert!(version.subresources.as_ref().unwrap().status.is_some());
}

#[test]
fn test_dataplane_status_roundtrip() {
    let status = DataPlaneStatus {
        conditions: vec![Condition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            reason: "DeploymentAvailable".to_string(),
            message: "all replicas ready".to_string(),
            observed_generation: Some(2),
            last_transition_time: "2026-01-01T00:00:00Z".to_string(),
        }],
        addresses: vec![Address::ip("10.0.0.1")],
        ready_replicas: 3,
        rollout: Some(DataPlaneRolloutStatus {
            services: Some(RolloutStatusServices {
                admin_api: Some(RolloutStatusService {
                    name: "test-dataplane-admin-abcde".to_string(),
                    addresses: vec![Address::ip("10.96.0.17")],
                }),
            }),
        }),
    };

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["conditions"][0]["type"], "Ready");
    assert_eq!(json["rollout"]["services"]["adminAPI"]["name"], "test-dataplane-admin-abcde");

    let back: DataPlaneStatus = serde_json::from_value(json).unwrap();
    assert_eq!(back, status);
}
