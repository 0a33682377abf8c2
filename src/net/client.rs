//! Shared `reqwest` client construction.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};

use crate::config::TransportConfig;

/// User-Agent sent when `transport.user_agent` is not configured.
pub const USER_AGENT: &str = "sessiongate/0.1.0";

/// Connect timeout used until `[transport]` says otherwise.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-call timeout used until `[transport]` says otherwise.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The one `reqwest` client a session sends every call through, the refresh
/// call included.
///
/// Calls go out with JSON content negotiation and the configured User-Agent.
/// A request may shorten the timeout per call; an elapsed timeout surfaces as
/// [`ErrorKind::Timeout`](crate::error::ErrorKind::Timeout) and never enters
/// the refresh path.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Client with the built-in timeouts and User-Agent.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Client configured from the `[transport]` section.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .request_timeout(Duration::from_secs(config.timeout_secs))
            .build()
    }

    /// Underlying client, used by [`Transport`](crate::pipeline::Transport).
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Client> for HttpClient {
    fn from(inner: Client) -> Self {
        Self { inner }
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Builder for [`HttpClient`], preloaded with JSON headers and the built-in
/// timeouts.
pub struct HttpClientBuilder {
    builder: ClientBuilder,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            builder: Client::builder()
                .user_agent(USER_AGENT)
                .default_headers(json_headers())
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT),
        }
    }
}

impl HttpClientBuilder {
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.builder = self.builder.user_agent(ua);
        self
    }

    /// Time allowed to reach the API origin.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.connect_timeout(timeout);
        self
    }

    /// Time allowed for a whole call, response body included.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Build the client. An invalid setting (such as a User-Agent that is not
    /// a valid header value) falls back to a plain `reqwest` client.
    pub fn build(self) -> HttpClient {
        let inner = match self.builder.build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid transport settings, using a plain HTTP client");
                Client::default()
            }
        };
        HttpClient { inner }
    }
}
