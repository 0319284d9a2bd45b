//! Tests for leader election

use super::*;
use std::time::Duration;

fn lease(
    holder: Option<&str>,
    renewed_secs_ago: Option<i64>,
    ttl: Option<i32>,
    transitions: Option<i32>,
) -> (Lease, DateTime<Utc>) {
    let now = Utc::now();
    let lease = Lease {
        metadata: ObjectMeta::default(),
        spec: Some(LeaseSpec {
            holder_identity: holder.map(String::from),
            renew_time: renewed_secs_ago.map(|s| MicroTime(now - chrono::Duration::seconds(s))),
            lease_duration_seconds: ttl,
            lease_transitions: transitions,
            ..Default::default()
        }),
    };
    (lease, now)
}

#[test]
fn test_classify_own_lease_renews_even_past_ttl() {
    let (lease, now) = lease(Some("pod-a"), Some(120), Some(15), Some(3));
    assert_eq!(
        classify_lease(&lease, "pod-a", now),
        LeaseDisposition::OursToRenew
    );
}

#[test]
fn test_classify_fresh_peer_lease_stands_by() {
    let (lease, now) = lease(Some("pod-a"), Some(2), Some(15), Some(3));
    assert_eq!(
        classify_lease(&lease, "pod-b", now),
        LeaseDisposition::HeldByOther
    );
}

#[test]
fn test_classify_expired_peer_lease_is_claimable() {
    let (lease, now) = lease(Some("pod-a"), Some(60), Some(15), Some(3));
    assert_eq!(
        classify_lease(&lease, "pod-b", now),
        LeaseDisposition::Claimable { transitions: 3 }
    );
}

#[test]
fn test_classify_released_lease_is_claimable() {
    // Holder cleared on shutdown; renew time may still be fresh
    let (lease, now) = lease(None, Some(1), Some(15), Some(7));
    assert_eq!(
        classify_lease(&lease, "pod-b", now),
        LeaseDisposition::Claimable { transitions: 7 }
    );
}

#[test]
fn test_classify_malformed_lease_is_claimable() {
    let (lease, now) = lease(Some("pod-a"), None, None, None);
    assert_eq!(
        classify_lease(&lease, "pod-b", now),
        LeaseDisposition::Claimable { transitions: 0 }
    );

    let empty = Lease::default();
    assert_eq!(
        classify_lease(&empty, "pod-b", now),
        LeaseDisposition::Claimable { transitions: 0 }
    );
}

#[test]
fn test_leader_state_initially_not_leader() {
    let state = LeaderState::new();
    assert!(!state.is_leader(), "Should not be leader initially");
}

#[test]
fn test_leader_state_transitions() {
    let state = LeaderState::new();

    assert!(!state.is_leader());

    state.set_leader(true);
    assert!(state.is_leader());

    state.set_leader(false);
    assert!(!state.is_leader());
}

#[test]
fn test_leader_state_clones_share_state() {
    let state = LeaderState::new();
    let state2 = state.clone();

    assert!(!state.is_leader());
    assert!(!state2.is_leader());

    state.set_leader(true);

    assert!(state.is_leader());
    assert!(state2.is_leader(), "Clone should reflect same leader state");
}

/// Defaults and env overrides are checked in one test since both
/// mutate process-wide environment variables.
#[test]
fn test_leader_config_env_handling() {
    std::env::remove_var("POD_NAME");
    std::env::remove_var("POD_NAMESPACE");
    std::env::remove_var("HOSTNAME");

    let config = LeaderConfig::from_env();

    assert!(
        config.holder_id.starts_with("portti-"),
        "Should have UUID fallback"
    );
    assert_eq!(config.lease_namespace, "portti-system");
    assert_eq!(config.lease_name, "portti-leader");
    assert_eq!(
        config.lease_duration_seconds,
        DEFAULT_LEASE_TTL.as_secs() as i32
    );
    assert_eq!(config.renew_interval, DEFAULT_RENEW_INTERVAL);

    std::env::set_var("POD_NAME", "test-pod-123");
    std::env::set_var("POD_NAMESPACE", "test-namespace");

    let config = LeaderConfig::from_env();

    assert_eq!(config.holder_id, "test-pod-123");
    assert_eq!(config.lease_namespace, "test-namespace");

    std::env::remove_var("POD_NAME");
    std::env::remove_var("POD_NAMESPACE");
}

/// Test default constants are reasonable
#[test]
fn test_lease_timing_constants() {
    // Lease TTL should be reasonable (not too short, not too long)
    assert!(DEFAULT_LEASE_TTL >= Duration::from_secs(10));
    assert!(DEFAULT_LEASE_TTL <= Duration::from_secs(60));

    // Renew interval should be roughly 1/3 of TTL
    assert!(DEFAULT_RENEW_INTERVAL < DEFAULT_LEASE_TTL);
    assert!(DEFAULT_RENEW_INTERVAL >= Duration::from_secs(3));
}
