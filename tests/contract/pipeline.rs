use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use sessiongate::error::{ErrorKind, NO_RESPONSE_MESSAGE};
use sessiongate::pipeline::{ApiRequest, BackendResponse, Endpoint, HttpMethod};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::contract::common::{self, Harness, REFRESH_PATH};

#[tokio::test]
async fn test_request_without_token_is_unauthenticated() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/api/public/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/public/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let response = h
        .session
        .client()
        .get::<Value>("/api/public/status")
        .await
        .unwrap();
    assert!(response.is_success);
    assert_eq!(response.data["ok"], true);

    let err = h
        .session
        .client()
        .get::<Value>("/api/public/broken")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.status, Some(500));

    let requests = h.server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.headers.get("authorization").is_none()));
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_attaches_bearer_token() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token(
        "/api/admin/hubs",
        "a1",
        ResponseTemplate::new(200).set_body_json(json!({ "data": [] })),
    )
    .await;

    let response = h
        .session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.data["data"], json!([]));
}

#[tokio::test]
async fn test_server_errors_propagate_without_refresh() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token(
        "/api/admin/hubs/h1",
        "a1",
        ResponseTemplate::new(403)
            .set_body_json(json!({ "message": "Hub is archived", "statusCode": 403 })),
    )
    .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .patch::<Value, _>("/api/admin/hubs/h1", &json!({ "name": "x" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.status, Some(403));
    assert_eq!(err.message, "Hub is archived");
    assert_eq!(err.body.unwrap()["statusCode"], 403);
    assert_eq!(h.session.access_token().as_deref(), Some("a1"));
}

#[tokio::test]
async fn test_401_refreshes_and_replays_once() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/users", "a1", common::unauthorized())
        .await;
    h.mount_for_token(
        "/api/admin/users",
        "a2",
        ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "_id": "u1" }] })),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", "Bearer a1"))
        .and(body_json(json!({ "refreshToken": "r1" })))
        .respond_with(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let response = h
        .session
        .client()
        .get::<Value>("/api/admin/users")
        .await
        .unwrap();

    assert_eq!(response.data["data"][0]["_id"], "u1");
    assert_eq!(h.session.access_token().as_deref(), Some("a2"));
    assert_eq!(h.session.store().refresh_token().as_deref(), Some("r2"));
    assert_eq!(h.hits("/api/admin/users").await, 2);
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_second_401_is_final() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/reports", "a1", common::unauthorized())
        .await;
    h.mount_for_token("/api/admin/reports", "a2", common::unauthorized())
        .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .get::<Value>("/api/admin/reports")
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(err.status, Some(401));
    assert_eq!(h.hits("/api/admin/reports").await, 2);
    // The refreshed session survives a final 401.
    assert_eq!(h.session.access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/hubs", "a1", common::unauthorized())
        .await;
    common::refresh_mock(
        ResponseTemplate::new(401).set_body_json(json!({ "message": "Refresh token revoked" })),
    )
    .expect(1)
    .mount(&h.server)
    .await;

    let err = h
        .session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RefreshFailed);
    assert_eq!(err.status, Some(401));
    assert!(err.message.contains("Refresh token revoked"));
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.visits(), vec!["/login"]);
}

#[tokio::test]
async fn test_malformed_refresh_response_ends_session() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/hubs", "a1", common::unauthorized())
        .await;
    common::refresh_mock(ResponseTemplate::new(200).set_body_json(json!({
        "data": { "accessToken": { "token": "a2" } }
    })))
    .expect(1)
    .mount(&h.server)
    .await;

    let err = h
        .session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RefreshFailed);
    assert!(err.message.contains("refreshToken"));
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn test_refresh_endpoint_401_is_not_refreshed() {
    let h = Harness::logged_in("a1", "r1").await;
    common::refresh_mock(common::unauthorized())
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .post::<Value, _>(REFRESH_PATH, &json!({ "refreshToken": "r1" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(h.session.access_token().as_deref(), Some("a1"));
}

#[tokio::test]
async fn test_absolute_url_bypasses_base_but_keeps_auth() {
    let h = Harness::logged_in("a1", "r1").await;
    let other = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/uploads/logo.png"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&other)
        .await;

    let url = format!("{}/uploads/logo.png", other.uri());
    let response = h
        .session
        .client()
        .execute::<()>(ApiRequest::put(url))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert_eq!(h.hits("/uploads/logo.png").await, 0);
}

#[tokio::test]
async fn test_absolute_url_401_still_refreshes() {
    let h = Harness::logged_in("a1", "r1").await;
    let other = MockServer::start().await;
    Mock::given(path("/files"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(common::unauthorized())
        .mount(&other)
        .await;
    Mock::given(path("/files"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&other)
        .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let url = format!("{}/files", other.uri());
    let response = h
        .session
        .client()
        .get::<Vec<Value>>(&url)
        .await
        .unwrap();
    assert!(response.data.is_empty());
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token(
        "/api/admin/slow",
        "a1",
        ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
    )
    .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .execute::<Value>(ApiRequest::get("/api/admin/slow").timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.status.is_none());
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_no_response_message() {
    let h = Harness::logged_in("a1", "r1").await;

    // Nothing listens on port 9 of the loopback interface.
    let err = h
        .session
        .client()
        .execute::<Value>(ApiRequest::get("/x").base_url("http://127.0.0.1:9".parse().unwrap()))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NoResponse);
    assert_eq!(err.message, NO_RESPONSE_MESSAGE);
    assert!(h.session.is_authenticated());
}

#[derive(Debug, Deserialize)]
struct Hub {
    #[serde(rename = "_id")]
    id: String,
    name: String,
}

struct RenameHub {
    id: &'static str,
    body: Value,
}

impl Endpoint for RenameHub {
    type Request = Value;
    type Response = BackendResponse<Hub>;
    const METHOD: HttpMethod = HttpMethod::Patch;

    fn path(&self) -> String {
        format!("/api/admin/hubs/{}", self.id)
    }

    fn body(&self) -> Option<&Value> {
        Some(&self.body)
    }
}

#[tokio::test]
async fn test_typed_endpoint_call() {
    let h = Harness::logged_in("a1", "r1").await;
    Mock::given(method("PATCH"))
        .and(path("/api/admin/hubs/h1"))
        .and(body_json(json!({ "name": "North" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "_id": "h1", "name": "North" },
            "message": "Hub updated",
            "statusCode": 200
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let response = h
        .session
        .client()
        .call(&RenameHub {
            id: "h1",
            body: json!({ "name": "North" }),
        })
        .await
        .unwrap();

    let hub = response.data.data.unwrap();
    assert_eq!(hub.id, "h1");
    assert_eq!(hub.name, "North");
    assert_eq!(response.data.message.as_deref(), Some("Hub updated"));
}

#[tokio::test]
async fn test_make_request_and_decode_error() {
    let h = Harness::logged_in("a1", "r1").await;
    Mock::given(method("DELETE"))
        .and(path("/api/admin/hubs/h2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .make_request::<Value>(HttpMethod::Delete, "/api/admin/hubs/h2", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Decode);
    assert_eq!(err.status, Some(200));
}
