//! Normalized responses and the per-endpoint contract.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::request::{ApiRequest, HttpMethod};
use crate::error::TransportError;

/// A successful call: decoded payload plus a success marker.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub headers: HeaderMap,
    pub is_success: bool,
}

impl<T> ApiResponse<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            is_success: self.is_success,
        }
    }
}

/// The backend's response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

/// Typed description of one backend endpoint.
///
/// Keeps the transport payload-agnostic while each call site stays typed.
pub trait Endpoint {
    /// Request body type. Use `()` for endpoints without a body.
    type Request: Serialize;
    /// Decoded response type.
    type Response: DeserializeOwned;

    const METHOD: HttpMethod;

    /// Path (or absolute URL) of this call.
    fn path(&self) -> String;

    fn body(&self) -> Option<&Self::Request> {
        None
    }

    fn to_request(&self) -> Result<ApiRequest, TransportError> {
        let request = ApiRequest::new(Self::METHOD, self.path());
        match self.body() {
            Some(body) => request.json(body),
            None => Ok(request),
        }
    }
}
