//! Token hash claims (`at_hash`, `rt_hash`).
//!
//! The digest is chosen by the bit suffix of the JWS algorithm the ID token
//! is signed with: `*256` uses SHA-256, `*384` SHA-384 and `*512` SHA-512.
//! `EdDSA` uses SHA-512.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::{AtHashMode, JwtError};

/// SHA-2 variant implied by a JWS algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Selects the hash for a JWS algorithm name such as `RS256`.
    ///
    /// # Errors
    ///
    /// Returns [`JwtError::UnsupportedAlgorithm`] if the name carries no
    /// known bit suffix.
    pub fn for_jws_alg(alg: &str) -> Result<Self, JwtError> {
        if alg == "EdDSA" {
            return Ok(Self::Sha512);
        }
        if alg.ends_with("256") {
            Ok(Self::Sha256)
        } else if alg.ends_with("384") {
            Ok(Self::Sha384)
        } else if alg.ends_with("512") {
            Ok(Self::Sha512)
        } else {
            Err(JwtError::unsupported_algorithm(alg))
        }
    }

    /// Hashes `data`.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Computes the hash claim of `token` for an ID token signed with `alg`.
///
/// Used for both `at_hash` and `rt_hash`.
///
/// # Errors
///
/// Returns an error if `alg` implies no supported hash.
pub fn at_hash(token: &str, alg: &str, mode: AtHashMode) -> Result<String, JwtError> {
    let digest = HashAlgorithm::for_jws_alg(alg)?.digest(token.as_bytes());

    Ok(match mode {
        AtHashMode::Canonical => URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]),
        AtHashMode::LegacyHexPrefix => {
            let hex = hex::encode(&digest);
            URL_SAFE.encode(&hex[..hex.len() / 2 - 1])
        }
    })
}
