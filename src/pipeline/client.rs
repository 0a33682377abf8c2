//! The request pipeline: bearer attachment, 401 recovery and replay.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::request::{ApiRequest, HttpMethod};
use super::response::{ApiResponse, Endpoint};
use super::transport::{RawResponse, Transport};
use crate::credentials::CredentialStore;
use crate::error::{RefreshError, TransportError};
use crate::expiry::{is_expiring, PROACTIVE_BUFFER_SECS, REACTIVE_BUFFER_SECS};
use crate::refresh::{RefreshCoordinator, DEFAULT_REFRESH_PATH};

/// Authenticated API client.
///
/// Every call:
/// 1. Attaches the current access token, if any, as a bearer credential
/// 2. Sends once; non-401 failures propagate unchanged
/// 3. On a first 401, refreshes through the coordinator and replays once
///
/// The refresh call itself never enters step 3.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    coordinator: RefreshCoordinator,
    refresh_path: String,
    reactive_buffer_secs: i64,
    proactive_buffer_secs: i64,
}

impl ApiClient {
    pub fn new(transport: Transport, coordinator: RefreshCoordinator) -> Self {
        Self {
            transport,
            coordinator,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            reactive_buffer_secs: REACTIVE_BUFFER_SECS,
            proactive_buffer_secs: PROACTIVE_BUFFER_SECS,
        }
    }

    /// Path of the refresh endpoint; requests to it are never refreshed.
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_reactive_buffer(mut self, secs: i64) -> Self {
        self.reactive_buffer_secs = secs;
        self
    }

    pub fn with_proactive_buffer(mut self, secs: i64) -> Self {
        self.proactive_buffer_secs = secs;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &CredentialStore {
        self.coordinator.store()
    }

    /// Execute `request` and decode the body into `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse<T>, TransportError> {
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            path = %request.target(),
        );
        async move { self.execute_raw(request).await?.decode() }
            .instrument(span)
            .await
    }

    /// Refresh proactively when the access token is near expiry.
    ///
    /// Meant to run before a batch of calls. Missing or undecodable claims
    /// count as expiring; a failed refresh ends the session.
    pub async fn ensure_fresh(&self) -> Result<(), RefreshError> {
        let claims = self.store().claims();
        if !is_expiring(claims.as_ref(), self.proactive_buffer_secs) {
            return Ok(());
        }
        info!(
            expires_at = ?claims.and_then(|c| c.expires_at),
            "Access token expiring soon, refreshing proactively"
        );
        self.coordinator.refresh().await.map(|_| ())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, TransportError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, TransportError> {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, TransportError> {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, TransportError> {
        self.execute(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, TransportError> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Untyped call with an optional JSON body.
    pub async fn make_request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse<T>, TransportError> {
        let mut request = ApiRequest::new(method, endpoint);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.execute(request).await
    }

    /// Typed call through an [`Endpoint`] description.
    pub async fn call<E: Endpoint>(
        &self,
        endpoint: &E,
    ) -> Result<ApiResponse<E::Response>, TransportError> {
        self.execute(endpoint.to_request()?).await
    }

    async fn execute_raw(&self, mut request: ApiRequest) -> Result<RawResponse, TransportError> {
        let is_refresh_call = self.is_refresh_call(&request);
        let token = if is_refresh_call {
            self.store().access_token()
        } else {
            let (token, refreshed) = self.current_token().await?;
            if refreshed {
                // The pre-check refresh was this request's one recovery.
                request.mark_retried();
            }
            token
        };

        let err = match self.transport.send(&request, token.as_deref()).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !err.is_unauthorized() || request.is_retried() || is_refresh_call {
            debug!(status = ?err.status, kind = ?err.kind, "Request failed");
            return Err(err);
        }

        request.mark_retried();
        info!("Received 401, refreshing credentials");

        let pair = self
            .coordinator
            .refresh_rejected(token.as_deref())
            .await
            .map_err(|e| {
                warn!(error = %e, "Refresh after 401 failed");
                TransportError::refresh_failed(&e)
            })?;

        debug!("Replaying request with refreshed token");
        self.transport.send(&request, Some(&pair.access_token)).await
    }

    // Token for the first attempt, and whether a refresh produced it. A token
    // already inside the reactive buffer is refreshed before sending.
    async fn current_token(&self) -> Result<(Option<String>, bool), TransportError> {
        let store = self.store();
        let Some(token) = store.access_token() else {
            return Ok((None, false));
        };
        let Some(claims) = store.claims() else {
            return Ok((Some(token), false));
        };
        if !is_expiring(Some(&claims), self.reactive_buffer_secs) {
            return Ok((Some(token), false));
        }

        debug!(expires_at = ?claims.expires_at, "Access token about to expire, refreshing first");
        match self.coordinator.refresh_rejected(Some(&token)).await {
            Ok(pair) => Ok((Some(pair.access_token), true)),
            Err(e) => Err(TransportError::refresh_failed(&e)),
        }
    }

    fn is_refresh_call(&self, request: &ApiRequest) -> bool {
        if request.is_refresh_call() {
            return true;
        }
        let target = request.target();
        let path = target.split(['?', '#']).next().unwrap_or(target);
        let refresh_path = self.refresh_path.trim_end_matches('/');
        !refresh_path.is_empty() && path.trim_end_matches('/').ends_with(refresh_path)
    }
}
