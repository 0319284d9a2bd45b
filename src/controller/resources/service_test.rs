#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity

use super::*;
use crate::crd::dataplane::{DataPlaneSpec, NetworkOptions, ProxyServiceOptions, ServicesOptions};
use crate::crd::DeploymentOptions;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};

fn dataplane(proxy: Option<ProxyServiceOptions>) -> DataPlane {
    DataPlane {
        metadata: ObjectMeta {
            name: Some("edge".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            ..Default::default()
        },
        spec: DataPlaneSpec {
            deployment: DeploymentOptions::default(),
            network: NetworkOptions {
                services: ServicesOptions {
                    admin: None,
                    proxy,
                },
            },
            rollout: None,
        },
        status: None,
    }
}

fn selector() -> BTreeMap<String, String> {
    [("app".to_string(), "edge".to_string())].into()
}

#[test]
fn test_build_admin_service_shape() {
    let service =
        build_admin_service(&dataplane(None), ServiceState::Preview, &selector()).unwrap();

    assert_eq!(service.metadata.generate_name.as_deref(), Some("edge-admin-"));
    let labels = service.metadata.labels.unwrap();
    assert_eq!(
        labels.get("portti.io/service-type").map(String::as_str),
        Some("admin")
    );
    assert_eq!(
        labels.get("portti.io/service-state").map(String::as_str),
        Some("preview")
    );

    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    assert_eq!(spec.selector.unwrap(), selector());
    let ports = spec.ports.unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, ADMIN_PORT);
}

#[test]
fn test_build_proxy_service_defaults_to_load_balancer() {
    let service = build_proxy_service(&dataplane(None), &selector()).unwrap();

    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
    let ports = spec.ports.unwrap();
    assert_eq!(ports.len(), 2);
    assert_eq!(ports[0].port, PROXY_HTTP_PORT);
    assert_eq!(ports[1].port, PROXY_HTTPS_PORT);
}

#[test]
fn test_build_proxy_service_honors_service_type_and_annotations() {
    let options = ProxyServiceOptions {
        service_type: Some("ClusterIP".to_string()),
        annotations: Some([("example.com/lb-class".to_string(), "internal".to_string())].into()),
    };
    let service = build_proxy_service(&dataplane(Some(options)), &selector()).unwrap();

    assert_eq!(service.spec.unwrap().type_.as_deref(), Some("ClusterIP"));
    assert_eq!(
        service
            .metadata
            .annotations
            .unwrap()
            .get("example.com/lb-class")
            .map(String::as_str),
        Some("internal")
    );
}

#[test]
fn test_merge_ports_preserves_assigned_node_ports() {
    let existing = vec![ServicePort {
        name: Some("http".to_string()),
        port: 80,
        node_port: Some(31234),
        ..Default::default()
    }];
    let desired = vec![
        ServicePort {
            name: Some("http".to_string()),
            port: 80,
            ..Default::default()
        },
        ServicePort {
            name: Some("https".to_string()),
            port: 443,
            ..Default::default()
        },
    ];

    let merged = merge_ports(Some(existing), Some(desired)).unwrap();
    assert_eq!(merged[0].node_port, Some(31234));
    assert_eq!(merged[1].node_port, None);
}

#[test]
fn test_service_addresses_prefers_load_balancer_ingress() {
    let service = Service {
        spec: Some(ServiceSpec {
            cluster_ip: Some("10.96.0.10".to_string()),
            ..Default::default()
        }),
        status: Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some("203.0.113.7".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    let addresses = service_addresses(&service);
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].value, "203.0.113.7");
    assert_eq!(addresses[0].address_type.as_deref(), Some("IPAddress"));
}

#[test]
fn test_service_addresses_falls_back_to_cluster_ip() {
    let service = Service {
        spec: Some(ServiceSpec {
            cluster_ip: Some("10.96.0.10".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let addresses = service_addresses(&service);
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].value, "10.96.0.10");
}

#[test]
fn test_service_addresses_skips_headless_marker() {
    let service = Service {
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert!(service_addresses(&service).is_empty());
}
