//! Error taxonomy for the authenticated transport.
//!
//! - [`TransportError`] is what every pipeline call fails with.
//! - [`RefreshError`] is the single outcome fanned out to every caller queued
//!   behind a refresh cycle, so it is `Clone`.
//! - [`CredentialError`] covers persistence of the credential pair.
//! - [`SessionError`] covers facade construction and login flows.

use reqwest::StatusCode;

/// Message surfaced when a request produced no response at all.
pub const NO_RESPONSE_MESSAGE: &str = "No response from server. Please check your connection.";

/// Fallback message when an error response carries no `message` field.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

/// Classification of a failed pipeline call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received (connectivity failure).
    NoResponse,
    /// The transport timeout elapsed before a response arrived.
    Timeout,
    /// The server answered with an error status other than 401.
    Server,
    /// The server answered 401 and no further recovery is attempted.
    Unauthorized,
    /// The refresh cycle behind this request failed; the session has ended.
    RefreshFailed,
    /// A 2xx body could not be decoded into the requested type.
    Decode,
    /// The request could not be built (bad URL, unserializable body).
    Request,
}

/// A failed pipeline call: `{message, status?, body?}`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<serde_json::Value>,
}

impl TransportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub fn no_response() -> Self {
        Self::new(ErrorKind::NoResponse, NO_RESPONSE_MESSAGE)
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Request, message)
    }

    /// Build an error from a non-2xx response.
    ///
    /// The message is taken from the body's `message` field when the body is
    /// JSON, otherwise [`SERVER_ERROR_MESSAGE`].
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let body = parse_body(body);
        let message = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| SERVER_ERROR_MESSAGE.to_string());

        let kind = if status == StatusCode::UNAUTHORIZED {
            ErrorKind::Unauthorized
        } else {
            ErrorKind::Server
        };

        Self {
            kind,
            message,
            status: Some(status.as_u16()),
            body,
        }
    }

    /// The refresh behind a 401 failed. Surfaced with status 401.
    pub fn refresh_failed(err: &RefreshError) -> Self {
        Self {
            kind: ErrorKind::RefreshFailed,
            message: format!("Session expired: {err}"),
            status: Some(StatusCode::UNAUTHORIZED.as_u16()),
            body: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            tracing::warn!(error = %err, "Request timed out");
            Self::new(ErrorKind::Timeout, "Request timed out")
        } else if err.is_builder() {
            Self::request(err.to_string())
        } else {
            tracing::warn!(error = %err, "No response from server");
            Self::no_response()
        }
    }
}

fn parse_body(body: &[u8]) -> Option<serde_json::Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(_) => Some(serde_json::Value::String(
            String::from_utf8_lossy(body).into_owned(),
        )),
    }
}

/// Outcome of a failed refresh cycle, shared by every waiter of that cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// No refresh token was held when the refresh was requested.
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The refresh call produced no response.
    #[error("Refresh request failed: {0}")]
    Network(String),

    /// The server explicitly rejected the refresh.
    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A 2xx response lacked the expected token fields.
    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The session was ended or replaced while the refresh was outstanding.
    #[error("Session ended during refresh")]
    SessionEnded,

    /// The refresh task went away before settling.
    #[error("Refresh interrupted")]
    Interrupted,
}

impl From<TransportError> for RefreshError {
    fn from(err: TransportError) -> Self {
        match (err.kind, err.status) {
            (_, Some(status)) => Self::Rejected {
                status,
                message: err.message,
            },
            _ => Self::Network(err.message),
        }
    }
}

/// Errors raised while persisting or restoring credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Both tokens must be present together.
    #[error("Credential pair is incomplete")]
    IncompletePair,

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors raised by the [`Session`](crate::session::Session) facade.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Missing login details")]
    MissingLoginDetails,
}
