//! Per-client signing keys.

use std::fmt;

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};

use crate::token::JwtError;

/// Key material used to sign the ID tokens of one client.
///
/// For HMAC algorithms (`HS*`) `private_key` holds the shared secret and
/// `public_key` is empty. For RSA and EC algorithms both fields hold PEM.
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningKey {
    /// Key identifier, emitted as the JWT `kid` header.
    pub id: String,

    /// Client the key belongs to.
    pub client_id: String,

    /// JWS algorithm name, e.g. `RS256`.
    pub alg: String,

    /// PEM-encoded public key.
    #[serde(default)]
    pub public_key: String,

    /// PEM-encoded private key, or the shared secret for `HS*`.
    pub private_key: String,
}

impl SigningKey {
    /// Creates an HMAC key from a shared secret.
    #[must_use]
    pub fn hmac(
        client_id: impl Into<String>,
        alg: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            alg: alg.into(),
            public_key: String::new(),
            private_key: secret.into(),
        }
    }

    /// Generates a 2048-bit RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if `alg` is not an RSA algorithm or key generation fails.
    pub fn generate_rsa(
        client_id: impl Into<String>,
        alg: impl Into<String>,
    ) -> Result<Self, JwtError> {
        let alg = alg.into();
        if !(alg.starts_with("RS") || alg.starts_with("PS")) {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                alg
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            alg,
            public_key: public_pem,
            private_key: private_pem.to_string(),
        })
    }

    /// Returns `true` for shared-secret algorithms.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.alg.starts_with("HS")
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("alg", &self.alg)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_key() {
        let key = SigningKey::hmac("client-1", "HS256", "secret");
        assert!(key.is_symmetric());
        assert!(key.public_key.is_empty());
    }

    #[test]
    fn test_generate_rsa_rejects_non_rsa_alg() {
        let err = SigningKey::generate_rsa("client-1", "ES256").unwrap_err();
        assert!(matches!(err, JwtError::InvalidKey { .. }));
    }

    #[test]
    fn test_generate_rsa() {
        let key = SigningKey::generate_rsa("client-1", "RS256").unwrap();
        assert!(key.private_key.contains("BEGIN PRIVATE KEY"));
        assert!(key.public_key.contains("BEGIN PUBLIC KEY"));
        assert!(!key.is_symmetric());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = SigningKey::hmac("client-1", "HS256", "super-secret");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
