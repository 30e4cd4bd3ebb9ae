//! Access token, signing key and user claim storage.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::CibaResult;
use crate::types::{AccessToken, SigningKey};

/// Storage for issued access tokens.
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Persists a newly minted token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored.
    async fn create(&self, token: &AccessToken) -> CibaResult<()>;

    /// Finds a token by its opaque value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, value: &str) -> CibaResult<Option<AccessToken>>;

    /// Lists the tokens issued to a client for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_and_user(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> CibaResult<Vec<AccessToken>>;
}

/// Read access to per-client signing keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Finds the key used to sign ID tokens for a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_private_key_by_client_id(&self, client_id: &str)
    -> CibaResult<Option<SigningKey>>;
}

/// Source of the extra ID token claims released for a user and scope.
#[async_trait]
pub trait UserClaimStore: Send + Sync {
    /// Returns the claims of `user_id` released by the space-separated
    /// `scope`. Unknown users and scopes yield an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_user_claims(&self, user_id: &str, scope: &str) -> CibaResult<Map<String, Value>>;
}
