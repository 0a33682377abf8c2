//! Outbound request description.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use url::Url;

use crate::error::TransportError;

/// Methods accepted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("Unsupported HTTP method: {other}")),
        }
    }
}

/// A single call: method, target, optional JSON body and per-call overrides.
///
/// `target` is either a path joined onto the base address or an absolute
/// `http(s)://` URL, which bypasses the base address.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: HttpMethod,
    target: String,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    retried: bool,
    refresh_call: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            body: None,
            headers: HeaderMap::new(),
            base_url: None,
            timeout: None,
            retried: false,
            refresh_call: false,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, target)
    }

    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, target)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, TransportError> {
        let value = serde_json::to_value(body)
            .map_err(|e| TransportError::request(format!("Failed to serialize request body: {e}")))?;
        Ok(self.body(value))
    }

    /// Attach an already built JSON body.
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a per-call header. Replaces any earlier value for `name`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge per-call headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Use `base_url` instead of the transport's base address.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn body_json(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Already replayed once after a 401.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// This request is the token refresh call itself.
    pub fn is_refresh_call(&self) -> bool {
        self.refresh_call
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    pub(crate) fn as_refresh_call(mut self) -> Self {
        self.refresh_call = true;
        self
    }

    /// Final URL against `default_base`, honoring the per-call base override.
    pub fn resolve_url(&self, default_base: &Url) -> Result<Url, TransportError> {
        let raw = if is_absolute_url(&self.target) {
            self.target.clone()
        } else {
            let base = self.base_url.as_ref().unwrap_or(default_base);
            combine_urls(base.as_str(), &self.target)
        };
        Url::parse(&raw).map_err(|e| TransportError::request(format!("Invalid URL '{raw}': {e}")))
    }
}

/// `http://` or `https://`, case-insensitive.
pub fn is_absolute_url(target: &str) -> bool {
    let has_prefix = |prefix: &str| {
        target
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    has_prefix("http://") || has_prefix("https://")
}

fn combine_urls(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
