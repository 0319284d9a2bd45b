#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity

use super::*;
use crate::crd::dataplane::DataPlaneStatus;

fn condition(type_: &str, status: &str, reason: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: String::new(),
        observed_generation: None,
        last_transition_time: "2026-01-01T00:00:00Z".to_string(),
    }
}

#[test]
fn test_set_condition_appends_new_type() {
    let mut status = DataPlaneStatus::default();

    set_condition(&mut status, condition("Ready", "False", "DeploymentNotAvailable"));

    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].type_, "Ready");
}

#[test]
fn test_set_condition_replaces_same_type_in_place() {
    let mut status = DataPlaneStatus::default();
    set_condition(&mut status, condition("Ready", "False", "DeploymentNotAvailable"));
    set_condition(&mut status, condition("Ready", "True", "DeploymentAvailable"));

    // Replace semantics: the list does not grow
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].status, "True");
    assert_eq!(status.conditions[0].reason, "DeploymentAvailable");
}

#[test]
fn test_set_condition_preserves_transition_time_when_status_unchanged() {
    let mut status = DataPlaneStatus::default();
    set_condition(&mut status, condition("Ready", "True", "DeploymentAvailable"));

    let mut refreshed = new_condition("Ready", "True", "DeploymentAvailable", "", Some(3));
    refreshed.last_transition_time = "2026-02-02T00:00:00Z".to_string();
    set_condition(&mut status, refreshed);

    // Same status value means no transition happened
    assert_eq!(
        status.conditions[0].last_transition_time,
        "2026-01-01T00:00:00Z"
    );
}

#[test]
fn test_prune_caps_list_at_eight_dropping_oldest_first() {
    let mut status = DataPlaneStatus::default();
    for i in 0..12 {
        set_condition(&mut status, condition(&format!("Type{}", i), "True", "Reason"));
    }

    assert_eq!(status.conditions.len(), MAX_CONDITIONS);
    // The first four types were evicted oldest-first
    assert_eq!(status.conditions[0].type_, "Type4");
    assert_eq!(status.conditions.last().unwrap().type_, "Type11");
}

#[test]
fn test_is_ready() {
    let mut status = DataPlaneStatus::default();
    assert!(!is_ready(&status));

    set_condition(&mut status, condition("Ready", "False", "DeploymentNotAvailable"));
    assert!(!is_ready(&status));

    set_condition(&mut status, condition("Ready", "True", "DeploymentAvailable"));
    assert!(is_ready(&status));
}

#[test]
fn test_needs_status_update_ignores_order_and_timestamps() {
    let a = vec![
        condition("Ready", "True", "DeploymentAvailable"),
        condition("RolledOut", "False", "AwaitingPromotion"),
    ];
    let mut b = vec![
        condition("RolledOut", "False", "AwaitingPromotion"),
        condition("Ready", "True", "DeploymentAvailable"),
    ];
    b[0].last_transition_time = "2026-03-03T00:00:00Z".to_string();

    assert!(!needs_status_update(&a, &b));
}

#[test]
fn test_needs_status_update_detects_content_drift() {
    let a = vec![condition("Ready", "True", "DeploymentAvailable")];
    let b = vec![condition("Ready", "False", "DeploymentNotAvailable")];
    assert!(needs_status_update(&a, &b));

    let c = vec![];
    assert!(needs_status_update(&a, &c));
}
