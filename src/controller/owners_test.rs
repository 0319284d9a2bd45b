#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity

use super::*;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

fn deployment(name: &str, created_secs: Option<i64>) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            creation_timestamp: created_secs
                .map(|s| Time(Utc.timestamp_opt(s, 0).unwrap())),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_is_owned_by_matches_uid() {
    let meta = ObjectMeta {
        owner_references: Some(vec![OwnerReference {
            api_version: "portti.io/v1alpha1".to_string(),
            kind: "DataPlane".to_string(),
            name: "edge".to_string(),
            uid: "uid-123".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    assert!(is_owned_by(&meta, "uid-123"));
    assert!(!is_owned_by(&meta, "uid-456"));
}

#[test]
fn test_is_owned_by_without_references() {
    assert!(!is_owned_by(&ObjectMeta::default(), "uid-123"));
}

#[test]
fn test_pick_survivor_earliest_creation_wins() {
    let candidates = vec![
        deployment("newer", Some(2_000)),
        deployment("oldest", Some(1_000)),
        deployment("middle", Some(1_500)),
    ];

    assert_eq!(pick_survivor(&candidates), Some(1));
}

#[test]
fn test_pick_survivor_ties_broken_by_name() {
    let candidates = vec![
        deployment("edge-b", Some(1_000)),
        deployment("edge-a", Some(1_000)),
    ];

    assert_eq!(pick_survivor(&candidates), Some(1));
}

#[test]
fn test_pick_survivor_missing_timestamp_sorts_last() {
    // An object the server never stamped should not displace an
    // established one
    let candidates = vec![
        deployment("no-timestamp", None),
        deployment("established", Some(1_000)),
    ];

    assert_eq!(pick_survivor(&candidates), Some(1));
}

#[test]
fn test_pick_survivor_empty_input() {
    let candidates: Vec<Deployment> = vec![];
    assert_eq!(pick_survivor(&candidates), None);
}
