//! Claims decoded from the access token payload.
//!
//! The access token is a JWT; only its middle segment is read. The signature
//! is not verified here because the server remains the authority on whether a
//! token is acceptable. Decoding never fails loudly: any malformed input
//! yields `None`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Read-only projection of the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedClaims {
    /// Subject (user) id, from `_id` or `sub`.
    pub subject: Option<String>,
    /// Display name.
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    /// Issued-at, epoch seconds.
    pub issued_at: Option<i64>,
    /// Expiry, epoch seconds.
    pub expires_at: Option<i64>,
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(rename = "_id")]
    id: Option<String>,
    sub: Option<String>,
    name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
}

impl From<RawClaims> for DecodedClaims {
    fn from(raw: RawClaims) -> Self {
        Self {
            subject: raw.id.or(raw.sub),
            name: raw.name,
            email: raw.email,
            role: raw.role,
            issued_at: raw.iat,
            expires_at: raw.exp,
        }
    }
}

impl DecodedClaims {
    /// Decode the payload segment of `token`.
    pub fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let raw: RawClaims = serde_json::from_slice(&bytes).ok()?;
        Some(raw.into())
    }
}

/// Result of comparing a token handed over in a URL with the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTokenCheck {
    pub is_same_user: bool,
    pub query_user_id: Option<String>,
}

/// Check whether `query_token` belongs to `current_user_id`.
///
/// An undecodable token, or no signed-in user, is never the same user.
pub fn validate_query_token(
    query_token: Option<&str>,
    current_user_id: Option<&str>,
) -> QueryTokenCheck {
    let query_user_id = query_token
        .and_then(DecodedClaims::decode)
        .and_then(|c| c.subject);
    let is_same_user = matches!(
        (current_user_id, query_user_id.as_deref()),
        (Some(current), Some(query)) if !current.is_empty() && current == query
    );
    QueryTokenCheck {
        is_same_user,
        query_user_id,
    }
}

/// Build an unsigned token carrying `claims`, for tests.
#[cfg(test)]
pub(crate) fn test_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
