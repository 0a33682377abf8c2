use std::sync::Arc;

use serde_json::{Value, json};
use sessiongate::config::Config;
use sessiongate::credentials::CredentialPair;
use sessiongate::error::{ErrorKind, SessionError};
use sessiongate::session::{RecordingNavigator, Session};
use wiremock::ResponseTemplate;

use crate::contract::common::{self, Harness};

#[tokio::test]
async fn test_login_callback_then_authenticated_call() {
    let h = Harness::start().await;
    h.mount_for_token(
        "/api/admin/profile",
        "a1",
        ResponseTemplate::new(200).set_body_json(json!({ "email": "ada@example.com" })),
    )
    .await;

    let email = h
        .session
        .complete_login_callback("token=a1&refresh=r1&email=ada%40example.com")
        .unwrap();
    assert_eq!(email, "ada@example.com");
    assert_eq!(h.navigator.visits(), vec!["/workspace"]);

    let profile = h
        .session
        .client()
        .get::<Value>("/api/admin/profile")
        .await
        .unwrap();
    assert_eq!(profile.data["email"], email);
}

#[tokio::test]
async fn test_incomplete_callback_returns_to_login() {
    let h = Harness::start().await;
    let err = h
        .session
        .complete_login_callback("?token=a1&email=ada%40example.com")
        .unwrap_err();

    assert!(matches!(err, SessionError::MissingLoginDetails));
    assert!(!h.session.is_authenticated());
    assert_eq!(h.navigator.visits(), vec!["/login"]);
}

#[tokio::test]
async fn test_force_logout_drops_bearer() {
    let h = Harness::logged_in("a1", "r1").await;
    h.mount_for_token("/api/admin/hubs", "a1", ResponseTemplate::new(200))
        .await;

    h.session.force_logout();
    assert_eq!(h.navigator.visits(), vec!["/login"]);

    // No route matches an unauthenticated request.
    let err = h
        .session
        .client()
        .get::<Value>("/api/admin/hubs")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.status, Some(404));
}

#[tokio::test]
async fn test_session_survives_restart_with_file_storage() {
    let h = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();

    let open = || {
        let mut config = Config::default();
        config.transport.base_url = h.server.uri();
        config.storage.dir = dir.path().to_path_buf();
        Session::builder(config)
            .with_navigator(Arc::new(RecordingNavigator::new()))
            .build()
            .unwrap()
    };

    let first = open();
    assert!(!first.is_authenticated());
    first.login(CredentialPair::new("a1", "r1")).unwrap();
    drop(first);

    let second = open();
    assert_eq!(second.store().get(), Some(CredentialPair::new("a1", "r1")));

    second.force_logout();
    let third = open();
    assert!(!third.is_authenticated());
}

#[tokio::test]
async fn test_refresh_persists_to_file_storage() {
    let h = Harness::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.transport.base_url = h.server.uri();
    config.storage.dir = dir.path().to_path_buf();

    let session = Session::from_config(config.clone()).unwrap();
    session.login(CredentialPair::new("a1", "r1")).unwrap();
    common::refresh_mock(common::refresh_ok("a2", "r2"))
        .expect(1)
        .mount(&h.server)
        .await;

    session.client().coordinator().refresh().await.unwrap();

    let reopened = Session::from_config(config).unwrap();
    assert_eq!(reopened.store().get(), Some(CredentialPair::new("a2", "r2")));
}

#[tokio::test]
async fn test_query_token_identity() {
    let mine = common::jwt(json!({ "_id": "u1", "email": "ada@example.com" }));
    let theirs = common::jwt(json!({ "_id": "u2" }));
    let h = Harness::logged_in(&mine, "r1").await;

    assert!(h.session.check_query_token(Some(&mine)).is_same_user);
    assert!(!h.session.check_query_token(Some(&theirs)).is_same_user);
    assert!(!h.session.check_query_token(Some("garbage")).is_same_user);
    assert_eq!(
        h.session.current_user().unwrap().email.as_deref(),
        Some("ada@example.com")
    );
}
