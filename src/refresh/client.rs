//! The refresh endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialPair;
use crate::error::RefreshError;
use crate::pipeline::{ApiRequest, BackendResponse, Transport};

/// Default path of the refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh-token";

/// Exchanges the current pair for a new one.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self, current: &CredentialPair) -> Result<CredentialPair, RefreshError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenField {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenData {
    access_token: Option<TokenField>,
    refresh_token: Option<TokenField>,
}

/// `POST {path}` with `{"refreshToken": ...}`.
///
/// A 2xx answer must carry `data.accessToken.token` and
/// `data.refreshToken.token`; anything less is a failed refresh.
#[derive(Debug, Clone)]
pub struct HttpRefreshClient {
    transport: Transport,
    path: String,
}

impl HttpRefreshClient {
    pub fn new(transport: Transport, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl RefreshClient for HttpRefreshClient {
    async fn refresh(&self, current: &CredentialPair) -> Result<CredentialPair, RefreshError> {
        let request = ApiRequest::post(&self.path)
            .json(&RefreshTokenRequest {
                refresh_token: &current.refresh_token,
            })?
            .as_refresh_call();

        let response = self
            .transport
            .send(&request, Some(&current.access_token))
            .await?;

        debug!(status = response.status.as_u16(), "Refresh endpoint answered");
        parse_refresh_response(&response.body)
    }
}

fn parse_refresh_response(body: &[u8]) -> Result<CredentialPair, RefreshError> {
    let envelope: BackendResponse<RefreshTokenData> = serde_json::from_slice(body)
        .map_err(|e| RefreshError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let data = envelope
        .data
        .ok_or_else(|| RefreshError::MalformedResponse("missing data".into()))?;

    let token = |field: Option<TokenField>, name: &str| {
        field
            .and_then(|f| f.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::MalformedResponse(format!("missing data.{name}.token")))
    };

    let access_token = token(data.access_token, "accessToken")?;
    let refresh_token = token(data.refresh_token, "refreshToken")?;
    Ok(CredentialPair::new(access_token, refresh_token))
}
