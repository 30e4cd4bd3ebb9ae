//! ID token signing.
//!
//! [`TokenSigner`] is the seam between the grant and the JWS engine. The
//! default [`JwtSigner`] uses `jsonwebtoken` with the per-client
//! [`SigningKey`] found in the key store.
//!
//! ## Supported Algorithms
//!
//! - **HS256 / HS384 / HS512**: `private_key` holds the shared secret
//! - **RS256 / RS384 / RS512 / PS256 / PS384 / PS512**: PEM key pair
//! - **ES256 / ES384**: PEM key pair
//! - **EdDSA**: PEM key pair

use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::{IdTokenClaims, JwtError};
use crate::types::SigningKey;

/// Signs and verifies ID tokens.
pub trait TokenSigner: Send + Sync {
    /// Signs `claims` with `key`, producing a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unusable or encoding fails.
    fn sign(&self, claims: &IdTokenClaims, key: &SigningKey) -> Result<String, JwtError>;

    /// Verifies `token` against `key` and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature, expiry or audience is invalid.
    fn verify(&self, token: &str, key: &SigningKey) -> Result<IdTokenClaims, JwtError>;
}

/// Parses a JWS algorithm name.
///
/// # Errors
///
/// Returns [`JwtError::UnsupportedAlgorithm`] for unknown names.
pub fn parse_algorithm(alg: &str) -> Result<Algorithm, JwtError> {
    Algorithm::from_str(alg).map_err(|_| JwtError::unsupported_algorithm(alg))
}

/// `jsonwebtoken`-backed signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtSigner;

impl JwtSigner {
    /// Creates a new signer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn encoding_key(alg: Algorithm, key: &SigningKey) -> Result<EncodingKey, JwtError> {
        let pem = key.private_key.as_bytes();
        let encoding_key = match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => EncodingKey::from_secret(pem),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem)?,
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem)?,
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem)?,
        };
        Ok(encoding_key)
    }

    fn decoding_key(alg: Algorithm, key: &SigningKey) -> Result<DecodingKey, JwtError> {
        let decoding_key = match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(key.private_key.as_bytes())
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(key.public_key.as_bytes())?,
            Algorithm::ES256 | Algorithm::ES384 => {
                DecodingKey::from_ec_pem(key.public_key.as_bytes())?
            }
            Algorithm::EdDSA => DecodingKey::from_ed_pem(key.public_key.as_bytes())?,
        };
        Ok(decoding_key)
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, claims: &IdTokenClaims, key: &SigningKey) -> Result<String, JwtError> {
        let alg = parse_algorithm(&key.alg)?;
        let encoding_key = Self::encoding_key(alg, key)?;

        let mut header = Header::new(alg);
        header.kid = Some(key.id.clone());

        jsonwebtoken::encode(&header, claims, &encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    fn verify(&self, token: &str, key: &SigningKey) -> Result<IdTokenClaims, JwtError> {
        let alg = parse_algorithm(&key.alg)?;
        let decoding_key = Self::decoding_key(alg, key)?;

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&key.client_id]);
        validation.set_required_spec_claims(&["iss", "sub", "aud", "exp"]);

        let data = jsonwebtoken::decode::<IdTokenClaims>(token, &decoding_key, &validation)?;
        Ok(data.claims)
    }
}
