//! Opaque access tokens minted by the CIBA grant.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Token type reported in token responses and callbacks.
pub const TOKEN_TYPE_BEARER: &str = "bearer";

/// An issued access token.
///
/// Created once per successful grant and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque token value (256 bits, base64url).
    pub value: String,

    /// Token type, always `bearer`.
    pub token_type: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// End-user the token represents.
    pub user_id: String,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the token stops being accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AccessToken {
    /// Mints a new token value for the given grant.
    #[must_use]
    pub fn mint(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        scope: impl Into<String>,
        lifetime: Duration,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            value: generate_token_value(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            client_id: client_id.into(),
            user_id: user_id.into(),
            scope: scope.into(),
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    /// Returns `true` if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Seconds between issuance and expiry.
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.created_at).whole_seconds()
    }
}

/// Generates a 256-bit random token value, base64url without padding.
#[must_use]
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
