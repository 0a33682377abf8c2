use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use sessiongate::config::{Config, StorageBackend};
use sessiongate::credentials::CredentialPair;
use sessiongate::session::{RecordingNavigator, Session};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REFRESH_PATH: &str = "/auth/refresh-token";

pub struct Harness {
    pub server: MockServer,
    pub session: Session,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let mut config = Config::default();
        config.transport.base_url = server.uri();
        config.storage.backend = StorageBackend::Memory;

        let navigator = Arc::new(RecordingNavigator::new());
        let session = Session::builder(config)
            .with_navigator(navigator.clone())
            .build()
            .expect("session builds");

        Self {
            server,
            session,
            navigator,
        }
    }

    /// Harness that already holds `access` / `refresh`.
    pub async fn logged_in(access: &str, refresh: &str) -> Self {
        let harness = Self::start().await;
        harness
            .session
            .login(CredentialPair::new(access, refresh))
            .expect("login");
        harness
    }

    /// `path` answers `status` to requests carrying `Bearer {token}`.
    pub async fn mount_for_token(&self, route: &str, token: &str, response: ResponseTemplate) {
        Mock::given(path(route))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server saw for `route`.
    pub async fn hits(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }
}

/// Successful refresh response carrying the given pair.
pub fn refresh_ok(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": {
            "accessToken": { "token": access },
            "refreshToken": { "token": refresh }
        },
        "message": "Token refreshed",
        "statusCode": 200
    }))
}

pub fn refresh_mock(response: ResponseTemplate) -> Mock {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(response)
}

pub fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "message": "Unauthorized",
        "statusCode": 401
    }))
}

/// Unsigned token carrying `claims`.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
