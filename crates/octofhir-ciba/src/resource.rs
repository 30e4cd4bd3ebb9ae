//! Bearer token checks for resources protected by CIBA-issued tokens.

use std::sync::Arc;

use crate::CibaResult;
use crate::error::CibaError;
use crate::scope;
use crate::storage::AccessTokenStore;
use crate::types::AccessToken;

/// Validates `Authorization: Bearer` headers against issued access tokens.
#[derive(Clone)]
pub struct ResourceGuard {
    access_tokens: Arc<dyn AccessTokenStore>,
}

impl ResourceGuard {
    /// Creates a guard over the access token store.
    #[must_use]
    pub fn new(access_tokens: Arc<dyn AccessTokenStore>) -> Self {
        Self { access_tokens }
    }

    /// Resolves the bearer token of a request and checks it covers
    /// `required_scope`.
    ///
    /// # Errors
    ///
    /// - `invalid_token` if the header is missing or malformed, or the token
    ///   is unknown or expired
    /// - `insufficient_scope` if the token's scope does not cover
    ///   `required_scope`
    pub async fn authorize(
        &self,
        authorization_header: Option<&str>,
        required_scope: Option<&str>,
    ) -> CibaResult<AccessToken> {
        // 1. Bearer token
        let value = authorization_header
            .and_then(|h| h.trim().strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CibaError::invalid_token("Missing bearer token"))?;

        // 2. Known token
        let token = self.access_tokens.find(value).await?.ok_or_else(|| {
            tracing::debug!("Unknown access token presented");
            CibaError::invalid_token("Unknown access token")
        })?;

        // 3. Expiry
        if token.is_expired() {
            tracing::debug!(client_id = %token.client_id, "Expired access token presented");
            return Err(CibaError::invalid_token("Access token expired"));
        }

        // 4. Scope
        if let Some(required) = required_scope
            && !scope::is_subset(required, &token.scope)
        {
            tracing::debug!(
                client_id = %token.client_id,
                required = %required,
                "Access token lacks required scope"
            );
            return Err(CibaError::insufficient_scope(format!(
                "Scope '{required}' required"
            )));
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::time::Duration;
    use time::OffsetDateTime;

    async fn guard_with_token(lifetime: Duration, issued: OffsetDateTime) -> (ResourceGuard, String) {
        let backend = MemoryBackend::new();
        let token = AccessToken::mint("client-1", "alice", "openid email", lifetime, issued);
        backend.access_tokens.create(&token).await.unwrap();
        (ResourceGuard::new(backend.access_tokens.clone()), token.value)
    }

    #[tokio::test]
    async fn test_valid_token() {
        let (guard, value) =
            guard_with_token(Duration::from_secs(3600), OffsetDateTime::now_utc()).await;
        let header = format!("Bearer {value}");

        let token = guard.authorize(Some(&header), Some("email")).await.unwrap();
        assert_eq!(token.user_id, "alice");

        let token = guard.authorize(Some(&header), None).await.unwrap();
        assert_eq!(token.client_id, "client-1");
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header() {
        let (guard, value) =
            guard_with_token(Duration::from_secs(3600), OffsetDateTime::now_utc()).await;

        for header in [None, Some("Bearer "), Some(value.as_str()), Some("Basic abc")] {
            let err = guard.authorize(header, None).await.unwrap_err();
            assert_eq!(err.error_code(), "invalid_token");
        }
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (guard, _) =
            guard_with_token(Duration::from_secs(3600), OffsetDateTime::now_utc()).await;
        let err = guard.authorize(Some("Bearer nope"), None).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let issued = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let (guard, value) = guard_with_token(Duration::from_secs(3600), issued).await;

        let err = guard
            .authorize(Some(&format!("Bearer {value}")), None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_token");
    }

    #[tokio::test]
    async fn test_insufficient_scope() {
        let (guard, value) =
            guard_with_token(Duration::from_secs(3600), OffsetDateTime::now_utc()).await;

        let err = guard
            .authorize(Some(&format!("Bearer {value}")), Some("openid address"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "insufficient_scope");
        assert_eq!(err.status_code(), 403);
    }
}
