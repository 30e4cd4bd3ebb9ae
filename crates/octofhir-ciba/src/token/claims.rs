//! ID token claims issued by the CIBA grant.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{AtHashMode, JwtError, at_hash};

/// Claim carrying the `auth_req_id` an ID token was issued for.
pub const AUTH_REQ_ID_CLAIM: &str = "urn:openid:params:jwt:claim:auth_req_id";

/// Claim carrying the hash of an issued refresh token.
pub const RT_HASH_CLAIM: &str = "urn:openid:params:jwt:claim:rt_hash";

/// Claims the builder owns; extra claims with these names are dropped.
const REGISTERED_CLAIMS: &[&str] = &[
    "iss",
    "sub",
    "aud",
    "exp",
    "iat",
    "auth_time",
    "nonce",
    "acr",
    "amr",
    "azp",
    "at_hash",
    AUTH_REQ_ID_CLAIM,
    RT_HASH_CLAIM,
];

/// ID token claims for OpenID Connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Issuer (server URL).
    pub iss: String,

    /// Subject (user ID).
    pub sub: String,

    /// Audience (client ID).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Time of the end-user's authentication (Unix timestamp).
    pub auth_time: i64,

    /// Backchannel request the token was issued for.
    #[serde(rename = "urn:openid:params:jwt:claim:auth_req_id")]
    pub auth_req_id: String,

    /// Access token hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    /// Refresh token hash.
    #[serde(
        rename = "urn:openid:params:jwt:claim:rt_hash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rt_hash: Option<String>,

    /// Nonce from the authentication request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Authentication context class reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// Authentication methods references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,

    /// Authorized party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// User claims released by scope.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Builder for [`IdTokenClaims`].
#[derive(Debug, Clone)]
pub struct ClaimsBuilder {
    iss: String,
    sub: String,
    aud: String,
    auth_req_id: String,
    issued_at: OffsetDateTime,
    lifetime: Duration,
    alg: String,
    hash_mode: AtHashMode,
    access_token: Option<String>,
    refresh_token: Option<String>,
    nonce: Option<String>,
    acr: Option<String>,
    amr: Option<Vec<String>>,
    azp: Option<String>,
    extra: Map<String, Value>,
}

impl ClaimsBuilder {
    /// Starts the claims of an ID token for `user_id`, issued to `client_id`
    /// for the given backchannel request.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        auth_req_id: impl Into<String>,
    ) -> Self {
        Self {
            iss: issuer.into(),
            sub: user_id.into(),
            aud: client_id.into(),
            auth_req_id: auth_req_id.into(),
            issued_at: OffsetDateTime::now_utc(),
            lifetime: Duration::from_secs(3600),
            alg: "RS256".to_string(),
            hash_mode: AtHashMode::Canonical,
            access_token: None,
            refresh_token: None,
            nonce: None,
            acr: None,
            amr: None,
            azp: None,
            extra: Map::new(),
        }
    }

    /// Sets `iat` and `auth_time`.
    #[must_use]
    pub fn issued_at(mut self, now: OffsetDateTime) -> Self {
        self.issued_at = now;
        self
    }

    /// Sets `exp - iat`.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Sets the signing algorithm, which selects the hash of `at_hash`.
    #[must_use]
    pub fn signing_alg(mut self, alg: impl Into<String>, mode: AtHashMode) -> Self {
        self.alg = alg.into();
        self.hash_mode = mode;
        self
    }

    /// Adds `at_hash` for the access token issued alongside.
    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Adds `rt_hash` for a refresh token issued alongside.
    #[must_use]
    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Sets the nonce.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the authentication context class reference.
    #[must_use]
    pub fn acr(mut self, acr: impl Into<String>) -> Self {
        self.acr = Some(acr.into());
        self
    }

    /// Sets the authentication methods references.
    #[must_use]
    pub fn amr(mut self, amr: Vec<String>) -> Self {
        self.amr = Some(amr);
        self
    }

    /// Sets the authorized party.
    #[must_use]
    pub fn azp(mut self, azp: impl Into<String>) -> Self {
        self.azp = Some(azp.into());
        self
    }

    /// Adds user claims. Names of registered claims are ignored.
    #[must_use]
    pub fn extra_claims(mut self, claims: Map<String, Value>) -> Self {
        for (name, value) in claims {
            if !REGISTERED_CLAIMS.contains(&name.as_str()) {
                self.extra.insert(name, value);
            }
        }
        self
    }

    /// Builds the claims.
    ///
    /// # Errors
    ///
    /// Returns an error if a token hash is requested for an algorithm with
    /// no known hash.
    pub fn build(self) -> Result<IdTokenClaims, JwtError> {
        let at_hash_claim = self
            .access_token
            .as_deref()
            .map(|t| at_hash(t, &self.alg, self.hash_mode))
            .transpose()?;
        let rt_hash_claim = self
            .refresh_token
            .as_deref()
            .map(|t| at_hash(t, &self.alg, self.hash_mode))
            .transpose()?;

        let iat = self.issued_at.unix_timestamp();
        let lifetime = i64::try_from(self.lifetime.as_secs())
            .map_err(|_| JwtError::invalid_claims("ID token lifetime out of range"))?;

        Ok(IdTokenClaims {
            iss: self.iss,
            sub: self.sub,
            aud: self.aud,
            exp: iat + lifetime,
            iat,
            auth_time: iat,
            auth_req_id: self.auth_req_id,
            at_hash: at_hash_claim,
            rt_hash: rt_hash_claim,
            nonce: self.nonce,
            acr: self.acr,
            amr: self.amr,
            azp: self.azp,
            extra: self.extra,
        })
    }
}
