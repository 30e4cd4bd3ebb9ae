//! Token construction for the CIBA grant.
//!
//! - [`hash`] - `at_hash` / `rt_hash` computation
//! - [`claims`] - ID token claims and their builder
//! - [`jwt`] - the [`TokenSigner`] seam and its `jsonwebtoken` implementation
//! - [`issuer`] - minting of the access token / ID token pair for a session

use serde::{Deserialize, Serialize};

use crate::error::CibaError;

pub mod claims;
pub mod hash;
pub mod issuer;
pub mod jwt;

pub use claims::{AUTH_REQ_ID_CLAIM, ClaimsBuilder, IdTokenClaims, RT_HASH_CLAIM};
pub use hash::{HashAlgorithm, at_hash};
pub use issuer::{TokenIssuer, TokenResponse};
pub use jwt::{JwtSigner, TokenSigner, parse_algorithm};

/// How the left half of the token digest is selected for `at_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtHashMode {
    /// Left-most half of the raw digest octets, base64url without padding
    /// (OpenID Connect Core 3.1.3.6).
    #[default]
    Canonical,

    /// First `hex.len() / 2 - 1` characters of the hex digest, base64url
    /// with padding. Only for relying parties built against servers that
    /// emit this form.
    LegacyHexPrefix,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// The algorithm is unknown or cannot be used here.
    #[error("Unsupported algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// The algorithm name.
        alg: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(alg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { alg: alg.into() }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for CibaError {
    fn from(err: JwtError) -> Self {
        CibaError::signing(err.to_string())
    }
}
