use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use sessiongate::credentials::{CredentialEvent, CredentialPair};
use sessiongate::error::ErrorKind;
use wiremock::ResponseTemplate;
use wiremock::matchers::{header, method, path};

use crate::contract::common::{self, Harness, REFRESH_PATH};

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/hubs", "a1", common::unauthorized())
        .await;
    h.mount_for_token(
        "/api/admin/hubs",
        "a2",
        ResponseTemplate::new(200).set_body_json(json!({ "data": [] })),
    )
    .await;
    common::refresh_mock(common::refresh_ok("a2", "r2").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&h.server)
        .await;

    let calls = (0..5).map(|_| {
        let session = h.session.clone();
        async move { session.client().get::<Value>("/api/admin/hubs").await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    let replays = h
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/admin/hubs")
        .filter(|r| {
            r.headers
                .get("authorization")
                .is_some_and(|v| v == "Bearer a2")
        })
        .count();
    assert_eq!(replays, 5);
    assert_eq!(h.session.access_token().as_deref(), Some("a2"));
    assert!(!h.session.client().coordinator().is_refreshing());
}

#[tokio::test]
async fn test_concurrent_refresh_failure_navigates_once() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/users", "a1", common::unauthorized())
        .await;
    common::refresh_mock(common::unauthorized().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&h.server)
        .await;

    let calls = (0..5).map(|_| {
        let session = h.session.clone();
        async move { session.client().get::<Value>("/api/admin/users").await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RefreshFailed);
        assert_eq!(err.status, Some(401));
    }
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.visits(), vec!["/login"]);
}

#[tokio::test]
async fn test_ensure_fresh_refreshes_ahead_of_expiry() {
    // Inside the proactive window, outside the reactive one.
    let old = common::jwt(json!({ "_id": "u1", "exp": common::now() + 120 }));
    let h = Harness::logged_in(&old, "r1").await;
    h.mount_for_token(
        "/api/admin/stats",
        &old,
        ResponseTemplate::new(200).set_body_json(json!({ "token": "old" })),
    )
    .await;
    h.mount_for_token(
        "/api/admin/stats",
        "a2",
        ResponseTemplate::new(200).set_body_json(json!({ "token": "new" })),
    )
    .await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    let before = h
        .session
        .client()
        .get::<Value>("/api/admin/stats")
        .await
        .unwrap();
    assert_eq!(before.data["token"], "old");

    h.session.ensure_fresh().await.unwrap();

    let after = h
        .session
        .client()
        .get::<Value>("/api/admin/stats")
        .await
        .unwrap();
    assert_eq!(after.data["token"], "new");
}

#[tokio::test]
async fn test_ensure_fresh_skips_healthy_token() {
    let token = common::jwt(json!({ "_id": "u1", "exp": common::now() + 3600 }));
    let h = Harness::logged_in(&token, "r1").await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(0)
        .mount(&h.server)
        .await;

    h.session.ensure_fresh().await.unwrap();
    assert_eq!(h.session.access_token(), Some(token));
}

#[tokio::test]
async fn test_ensure_fresh_failure_ends_session() {
    let token = common::jwt(json!({ "_id": "u1", "exp": common::now() - 5 }));
    let h = Harness::logged_in(&token, "r1").await;
    common::refresh_mock(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.session.ensure_fresh().await.unwrap_err();
    assert!(matches!(
        err,
        sessiongate::RefreshError::Rejected { status: 500, .. }
    ));
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn test_nearly_expired_token_refreshes_before_sending() {
    let old = common::jwt(json!({ "_id": "u1", "exp": common::now() + 30 }));
    let h = Harness::logged_in(&old, "r1").await;
    h.mount_for_token("/api/admin/hubs", &old, ResponseTemplate::new(200))
        .await;
    h.mount_for_token(
        "/api/admin/hubs",
        "a2",
        ResponseTemplate::new(200).set_body_json(json!({ "data": [] })),
    )
    .await;
    wiremock::Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", format!("Bearer {old}").as_str()))
        .respond_with(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    h.session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap();

    let requests = h.server.received_requests().await.unwrap();
    let hub_calls: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/admin/hubs")
        .collect();
    assert_eq!(hub_calls.len(), 1);
    assert_eq!(hub_calls[0].headers["authorization"], "Bearer a2");
}

#[tokio::test]
async fn test_pre_send_refresh_counts_as_the_one_recovery() {
    let old = common::jwt(json!({ "_id": "u1", "exp": common::now() + 30 }));
    let h = Harness::logged_in(&old, "r1").await;
    h.mount_for_token("/api/admin/hubs", "a2", common::unauthorized())
        .await;
    h.mount_for_token("/api/admin/hubs", "a3", ResponseTemplate::new(200))
        .await;
    wiremock::Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", format!("Bearer {old}").as_str()))
        .respond_with(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;
    wiremock::Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", "Bearer a2"))
        .respond_with(common::refresh_ok("a3", "r3"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(err.status, Some(401));
    assert_eq!(h.hits(REFRESH_PATH).await, 1);
    assert_eq!(h.hits("/api/admin/hubs").await, 1);
    // A final 401 leaves the refreshed session in place.
    assert_eq!(h.session.access_token().as_deref(), Some("a2"));
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_listeners_observe_refresh_and_logout() {
    let h = Harness::logged_in("a1", "r1").await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    h.session
        .on_credentials_changed(move |event| sink.lock().push(event.clone()));

    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    h.session.client().coordinator().refresh().await.unwrap();
    h.session.force_logout();

    assert_eq!(
        *events.lock(),
        vec![
            CredentialEvent::Set(CredentialPair::new("a2", "r2")),
            CredentialEvent::Cleared,
        ]
    );
}

#[tokio::test]
async fn test_refresh_without_session_ends_immediately() {
    let h = Harness::start().await;
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .session
        .client()
        .coordinator()
        .refresh()
        .await
        .unwrap_err();
    assert_eq!(err, sessiongate::RefreshError::MissingRefreshToken);
    assert_eq!(h.navigator.visits(), vec!["/login"]);
}
