//! Single-shot send: build the URL, attach headers, classify the outcome.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::request::ApiRequest;
use super::response::ApiResponse;
use crate::error::{ErrorKind, TransportError};
use crate::net::HttpClient;

/// Raw 2xx response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Decode the body into `T`. An empty body decodes from JSON `null`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, TransportError> {
        let decoded = if self.body.is_empty() {
            serde_json::from_value(serde_json::Value::Null)
        } else {
            serde_json::from_slice(&self.body)
        };
        let data = decoded.map_err(|e| {
            TransportError::new(ErrorKind::Decode, format!("Failed to decode response: {e}"))
                .with_status(self.status.as_u16())
        })?;
        Ok(ApiResponse {
            data,
            status: self.status.as_u16(),
            headers: self.headers,
            is_success: true,
        })
    }
}

/// HTTP client bound to a default base address.
///
/// Knows nothing about refresh: it sends exactly once and maps every
/// non-2xx status to a [`TransportError`].
#[derive(Debug, Clone)]
pub struct Transport {
    http: HttpClient,
    base_url: Url,
}

impl Transport {
    pub fn new(http: HttpClient, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Send `request` once, with `bearer` as the credential when present.
    pub async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        let url = request.resolve_url(&self.base_url)?;

        let mut headers = request.header_map().clone();
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| TransportError::request("Access token is not a valid header value"))?;
            headers.insert(AUTHORIZATION, value);
        }

        debug!(
            url = %url,
            authenticated = bearer.is_some(),
            retried = request.is_retried(),
            "Sending request"
        );

        let mut builder = self
            .http
            .inner()
            .request(request.method().into(), url)
            .headers(headers);
        if let Some(body) = request.body_json() {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout_override() {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        if !status.is_success() {
            return Err(TransportError::from_status(status, &body));
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
