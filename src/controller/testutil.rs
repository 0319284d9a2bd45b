//! Scripted Kubernetes API for exercising reconcile paths in tests
//!
//! Builds a [`kube::Client`] over a mock tower service; each test
//! spawns a scenario task that answers the requests it expects, in
//! order, and asserts on their method, path and body. An unexpected
//! extra request fails the call under test (the scripted endpoint is
//! gone); a missing one hangs the scenario, failing the test.

use http::{Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use tower_test::mock::{self, Handle};

use super::Context;
use crate::server::metrics::create_metrics;

pub type ApiHandle = Handle<Request<Body>, Response<Body>>;

/// Client wired to a scripted in-process API endpoint.
pub fn mock_client() -> (Client, ApiHandle) {
    let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(service, "default"), handle)
}

/// Full reconcile context over a scripted client.
pub fn mock_context() -> (Context, ApiHandle) {
    let (client, handle) = mock_client();
    let metrics = create_metrics().expect("metrics registry");
    (Context::new(client, metrics), handle)
}

/// Take the next request, assert its method, send the response, and
/// hand back the request path and body for further assertions.
pub async fn respond(
    handle: &mut ApiHandle,
    method: Method,
    response: Response<Body>,
) -> (String, Vec<u8>) {
    let (request, send) = handle.next_request().await.expect("expected an API request");
    assert_eq!(request.method(), &method, "unexpected request method");

    let path = request.uri().path().to_string();
    let body = request
        .into_body()
        .collect()
        .await
        .expect("request body readable")
        .to_bytes()
        .to_vec();

    send.send_response(response);
    (path, body)
}

pub fn json_response<T: serde::Serialize>(value: &T) -> Response<Body> {
    Response::builder()
        .body(Body::from(
            serde_json::to_vec(value).expect("serializable response"),
        ))
        .expect("valid response")
}

/// An ObjectList wrapping the given items, as a list call returns it.
pub fn list_response<T: serde::Serialize>(items: &[T]) -> Response<Body> {
    json_response(&serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "metadata": {"resourceVersion": "0"},
        "items": items,
    }))
}

/// A Kubernetes Status failure with the given code.
pub fn error_response(code: u16, reason: &str) -> Response<Body> {
    Response::builder()
        .status(code)
        .body(Body::from(
            serde_json::to_vec(&serde_json::json!({
                "apiVersion": "v1",
                "kind": "Status",
                "status": "Failure",
                "reason": reason,
                "message": reason,
                "code": code,
            }))
            .expect("serializable status"),
        ))
        .expect("valid response")
}
