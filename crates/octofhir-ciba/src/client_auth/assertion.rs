//! `client_secret_jwt` authentication (RFC 7523 client assertions).
//!
//! # JWT Assertion Requirements
//!
//! - `client_assertion_type` is [`CLIENT_ASSERTION_TYPE_JWT_BEARER`]
//! - the JWT is signed with HS256, HS384 or HS512 using the client secret
//! - `iss`, `sub`, `aud`, `jti` and `exp` are present
//! - `iss` and `sub` equal the client id
//! - `aud` is the token endpoint URL
//!
//! Replay protection via `jti` tracking is left to the embedding server.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{ClientAuthStrategy, ClientCredentials, TokenEndpointAuthMethod};
use crate::types::ClientApplication;

/// `client_assertion_type` value for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// JWT claims of a client assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer - must be the client_id.
    pub iss: String,

    /// Subject - must be the client_id.
    pub sub: String,

    /// Audience - must be the token endpoint URL.
    pub aud: StringOrArray,

    /// Expiration time as Unix timestamp.
    pub exp: i64,

    /// JWT ID.
    pub jti: String,

    /// Issued at time as Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Audience claim can be a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    /// Single string audience.
    String(String),
    /// Array of audience strings.
    Array(Vec<String>),
}

impl StringOrArray {
    /// Checks if the audience contains the specified value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::String(s) => s == value,
            Self::Array(arr) => arr.iter().any(|s| s == value),
        }
    }
}

/// Verifies HMAC-signed client assertions.
#[derive(Debug, Clone)]
pub struct JwtAssertionStrategy {
    token_endpoint: String,
}

impl JwtAssertionStrategy {
    /// Creates a strategy that expects `token_endpoint` as the audience.
    #[must_use]
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
        }
    }

    fn verify(&self, assertion: &str, client: &ClientApplication) -> Result<(), String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_required_spec_claims(&["iss", "sub", "aud", "exp"]);
        validation.set_audience(&[&self.token_endpoint]);
        validation.set_issuer(&[&client.id]);

        let key = DecodingKey::from_secret(client.secret.as_bytes());
        let claims = jsonwebtoken::decode::<ClientAssertionClaims>(assertion, &key, &validation)
            .map_err(|e| e.to_string())?
            .claims;

        if claims.iss != client.id {
            return Err("assertion issuer must equal client_id".to_string());
        }
        if claims.sub != client.id {
            return Err("assertion subject must equal client_id".to_string());
        }
        if !claims.aud.contains(&self.token_endpoint) {
            return Err("assertion audience must be the token endpoint".to_string());
        }
        if claims.jti.is_empty() {
            return Err("assertion jti must not be empty".to_string());
        }
        Ok(())
    }
}

impl ClientAuthStrategy for JwtAssertionStrategy {
    fn method(&self) -> TokenEndpointAuthMethod {
        TokenEndpointAuthMethod::ClientSecretJwt
    }

    fn authenticate(&self, credentials: &ClientCredentials, client: &ClientApplication) -> bool {
        if credentials.client_assertion_type.as_deref() != Some(CLIENT_ASSERTION_TYPE_JWT_BEARER) {
            return false;
        }
        let Some(assertion) = credentials.client_assertion.as_deref() else {
            return false;
        };

        match self.verify(assertion, client) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(client_id = %client.id, reason = %reason, "Client assertion rejected");
                false
            }
        }
    }
}

/// Extracts the client ID from an unverified JWT assertion.
///
/// Only used to pick the client registration to verify against. This does
/// NOT verify the signature.
#[must_use]
pub fn extract_client_id_unverified(assertion: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[derive(Deserialize)]
    struct MinimalClaims {
        #[serde(default)]
        iss: Option<String>,
        #[serde(default)]
        sub: Option<String>,
    }

    let mut parts = assertion.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: MinimalClaims = serde_json::from_slice(&payload_bytes).ok()?;

    // Prefer `sub`, which must equal the client id; fall back to `iss`
    claims.sub.or(claims.iss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryMode;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;
    use time::OffsetDateTime;

    const TOKEN_ENDPOINT: &str = "https://auth.example.com/token";

    fn client() -> ClientApplication {
        ClientApplication::new("jwt app", "openid", DeliveryMode::Poll)
            .with_auth_method(TokenEndpointAuthMethod::ClientSecretJwt)
    }

    fn sign(claims: &serde_json::Value, secret: &str, alg: Algorithm) -> String {
        jsonwebtoken::encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims(client_id: &str) -> serde_json::Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": client_id,
            "sub": client_id,
            "aud": TOKEN_ENDPOINT,
            "jti": uuid::Uuid::new_v4().to_string(),
            "exp": now + 120,
            "iat": now,
        })
    }

    #[test]
    fn test_valid_assertion() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let jwt = sign(&valid_claims(&c.id), &c.secret, Algorithm::HS256);

        assert!(strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_hs512_assertion() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let jwt = sign(&valid_claims(&c.id), &c.secret, Algorithm::HS512);

        assert!(strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_wrong_assertion_type() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let mut creds =
            ClientCredentials::assertion(sign(&valid_claims(&c.id), &c.secret, Algorithm::HS256));
        creds.client_assertion_type = Some("urn:example:other".to_string());

        assert!(!strategy.authenticate(&creds, &c));
    }

    #[test]
    fn test_wrong_secret() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let jwt = sign(&valid_claims(&c.id), "not-the-secret", Algorithm::HS256);

        assert!(!strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_wrong_audience() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let mut claims = valid_claims(&c.id);
        claims["aud"] = json!("https://elsewhere.example.com/token");
        let jwt = sign(&claims, &c.secret, Algorithm::HS256);

        assert!(!strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_subject_mismatch() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let mut claims = valid_claims(&c.id);
        claims["sub"] = json!("someone-else");
        let jwt = sign(&claims, &c.secret, Algorithm::HS256);

        assert!(!strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_missing_required_claims() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);

        for claim in ["iss", "sub", "aud", "jti", "exp"] {
            let mut claims = valid_claims(&c.id);
            claims.as_object_mut().unwrap().remove(claim);
            let jwt = sign(&claims, &c.secret, Algorithm::HS256);
            assert!(
                !strategy.authenticate(&ClientCredentials::assertion(jwt), &c),
                "assertion without {claim} must be rejected"
            );
        }
    }

    #[test]
    fn test_expired_assertion() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        let mut claims = valid_claims(&c.id);
        claims["exp"] = json!(OffsetDateTime::now_utc().unix_timestamp() - 600);
        let jwt = sign(&claims, &c.secret, Algorithm::HS256);

        assert!(!strategy.authenticate(&ClientCredentials::assertion(jwt), &c));
    }

    #[test]
    fn test_garbage_assertion() {
        let c = client();
        let strategy = JwtAssertionStrategy::new(TOKEN_ENDPOINT);
        assert!(!strategy.authenticate(&ClientCredentials::assertion("not.a.jwt"), &c));
        assert!(!strategy.authenticate(&ClientCredentials::assertion(""), &c));
    }

    #[test]
    fn test_extract_client_id_unverified() {
        let jwt = sign(&valid_claims("client-42"), "whatever", Algorithm::HS256);
        assert_eq!(extract_client_id_unverified(&jwt).as_deref(), Some("client-42"));
        assert_eq!(extract_client_id_unverified("abc"), None);
    }
}
