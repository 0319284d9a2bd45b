use portti::controller::{ReconcileError, CONVERGING_REQUEUE, DEFAULT_REQUEUE, ERROR_REQUEUE};

fn api_error(code: u16) -> ReconcileError {
    ReconcileError::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "test error".to_string(),
        reason: "InternalError".to_string(),
        code,
    }))
}

#[test]
fn test_conflict_errors_are_distinguished() {
    assert!(api_error(409).is_conflict());
    assert!(!api_error(500).is_conflict());
    assert!(!api_error(404).is_conflict());
    assert!(!ReconcileError::MissingNamespace.is_conflict());
}

#[test]
fn test_requeue_intervals_ordered() {
    // Converging objects are revisited well before the steady-state
    // resync, and error retries sit in between
    assert!(CONVERGING_REQUEUE < ERROR_REQUEUE);
    assert!(ERROR_REQUEUE < DEFAULT_REQUEUE);
}
