//! Minting of the token pair for a consented session.
//!
//! # Ordering
//!
//! Both tokens are built in memory first. The session is then redeemed with
//! a single [`SessionStore::consume`] call; only the caller that wins it
//! persists the access token and returns the response. A caller that loses
//! gets `expired_token` and nothing it built is ever stored.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{AtHashMode, ClaimsBuilder, TokenSigner};
use crate::CibaResult;
use crate::config::CibaConfig;
use crate::error::CibaError;
use crate::session::CibaSession;
use crate::storage::{AccessTokenStore, KeyStore, SessionStore, Stores, UserClaimStore};
use crate::types::{AccessToken, TOKEN_TYPE_BEARER};

/// Successful token response of the CIBA grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The opaque access token.
    pub access_token: String,

    /// Token type, always `bearer`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Signed ID token.
    pub id_token: String,
}

/// Builds, signs and records the tokens of a CIBA grant.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<dyn KeyStore>,
    claims: Arc<dyn UserClaimStore>,
    access_tokens: Arc<dyn AccessTokenStore>,
    sessions: Arc<dyn SessionStore>,
    signer: Arc<dyn TokenSigner>,
    issuer: String,
    access_token_lifetime: Duration,
    id_token_lifetime: Duration,
    at_hash_mode: AtHashMode,
}

impl TokenIssuer {
    /// Creates an issuer over the given stores.
    #[must_use]
    pub fn new(stores: &Stores, signer: Arc<dyn TokenSigner>, config: &CibaConfig) -> Self {
        Self {
            keys: stores.keys.clone(),
            claims: stores.claims.clone(),
            access_tokens: stores.access_tokens.clone(),
            sessions: stores.sessions.clone(),
            signer,
            issuer: config.issuer.clone(),
            access_token_lifetime: config.tokens.access_token_lifetime,
            id_token_lifetime: config.tokens.id_token_lifetime,
            at_hash_mode: config.tokens.at_hash,
        }
    }

    /// Issues an access token and an ID token for a consented session and
    /// redeems the session.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if the client has no signing key
    /// - `expired_token` if the session was redeemed, denied or expired
    ///   concurrently
    /// - infrastructure errors from the stores or the signer
    pub async fn issue(&self, session: &CibaSession) -> CibaResult<TokenResponse> {
        // 1. Signing key
        let key = self
            .keys
            .find_private_key_by_client_id(&session.client_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %session.client_id, "No signing key for client");
                CibaError::invalid_grant("No signing key registered for client")
            })?;

        // 2. Claims released by scope
        let extra = self
            .claims
            .get_user_claims(&session.user_id, &session.scope)
            .await?;

        // 3. Access token
        let now = OffsetDateTime::now_utc();
        let access_token = AccessToken::mint(
            &session.client_id,
            &session.user_id,
            &session.scope,
            self.access_token_lifetime,
            now,
        );

        // 4. ID token
        let claims = ClaimsBuilder::new(
            &self.issuer,
            &session.client_id,
            &session.user_id,
            &session.auth_req_id,
        )
        .issued_at(now)
        .lifetime(self.id_token_lifetime)
        .signing_alg(&key.alg, self.at_hash_mode)
        .access_token(&access_token.value)
        .extra_claims(extra)
        .build()?;
        let id_token = self.signer.sign(&claims, &key)?;

        // 5. Redeem the session (single winner)
        if !self
            .sessions
            .consume(&session.auth_req_id, &id_token, now)
            .await?
        {
            tracing::debug!(
                client_id = %session.client_id,
                "Session no longer redeemable, tokens discarded"
            );
            return Err(CibaError::expired_token("auth_req_id already used or expired"));
        }

        // 6. Persist the access token
        if let Err(e) = self.access_tokens.create(&access_token).await {
            tracing::error!(
                client_id = %session.client_id,
                error = %e,
                "Failed to persist access token after redeeming session"
            );
            return Err(e);
        }

        tracing::info!(
            client_id = %session.client_id,
            user_id = %session.user_id,
            scope = %session.scope,
            "Issued CIBA tokens"
        );

        Ok(TokenResponse {
            access_token: access_token.value,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.access_token_lifetime.as_secs(),
            id_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Consent, create_test_session};
    use crate::storage::MemoryBackend;
    use crate::token::{AUTH_REQ_ID_CLAIM, JwtSigner};
    use crate::types::SigningKey;
    use serde_json::json;

    struct Fixture {
        backend: MemoryBackend,
        issuer: TokenIssuer,
        key: SigningKey,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let key = SigningKey::hmac("client-1", "HS256", "issuer-test-secret");
        backend.keys.insert(key.clone());
        let issuer = TokenIssuer::new(
            &backend.stores(),
            Arc::new(JwtSigner::new()),
            &CibaConfig::default(),
        );
        Fixture {
            backend,
            issuer,
            key,
        }
    }

    async fn consented_session(backend: &MemoryBackend) -> CibaSession {
        let session = create_test_session("client-1", "alice");
        backend.sessions.create(&session).await.unwrap();
        backend
            .sessions
            .record_consent(&session.auth_req_id, Consent::Granted, OffsetDateTime::now_utc())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_issue_tokens() {
        let f = fixture();
        let session = consented_session(&f.backend).await;

        let response = f.issuer.issue(&session).await.unwrap();
        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 3600);

        let claims = JwtSigner::new().verify(&response.id_token, &f.key).unwrap();
        assert_eq!(claims.auth_req_id, session.auth_req_id);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.aud, "client-1");
        assert!(claims.at_hash.is_some());

        let value: serde_json::Value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value[AUTH_REQ_ID_CLAIM], json!(session.auth_req_id));

        let stored = f
            .backend
            .sessions
            .find_by_id(&session.auth_req_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.valid);
        assert_eq!(stored.id_token.as_deref(), Some(response.id_token.as_str()));

        let token = f
            .backend
            .access_tokens
            .find(&response.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.user_id, "alice");
    }

    #[tokio::test]
    async fn test_second_issue_fails() {
        let f = fixture();
        let session = consented_session(&f.backend).await;

        f.issuer.issue(&session).await.unwrap();
        let err = f.issuer.issue(&session).await.unwrap_err();
        assert_eq!(err.error_code(), "expired_token");
        assert_eq!(f.backend.access_tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_issue_single_winner() {
        let f = fixture();
        let session = consented_session(&f.backend).await;

        let (a, b) = tokio::join!(f.issuer.issue(&session), f.issuer.issue(&session));
        assert!(a.is_ok() ^ b.is_ok());
        assert_eq!(f.backend.access_tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_invalid_grant() {
        let f = fixture();
        let session = create_test_session("client-without-key", "alice");

        let err = f.issuer.issue(&session).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_extra_claims_released_by_scope() {
        let f = fixture();
        f.backend.claims.define_scope("openid", ["email"]);
        f.backend
            .claims
            .set_claim("alice", "email", json!("alice@example.com"));
        let session = consented_session(&f.backend).await;

        let response = f.issuer.issue(&session).await.unwrap();
        let claims = JwtSigner::new().verify(&response.id_token, &f.key).unwrap();
        assert_eq!(claims.extra["email"], json!("alice@example.com"));
    }
}
