//! Storage traits for CIBA data.
//!
//! The engine treats every store as an external, shared resource. Each
//! method is a serialization point that is atomic for its own record; no
//! cross-entity transactions are assumed.
//!
//! # Traits
//!
//! - [`ClientApplicationStore`] - registered clients (read-only)
//! - [`UserAccountStore`] - end-user accounts (read-only)
//! - [`SessionStore`] - `auth_req_id` sessions and their transitions
//! - [`AccessTokenStore`] - minted access tokens
//! - [`KeyStore`] - per-client signing keys (read-only)
//! - [`UserClaimStore`] - claims released by scope (read-only)
//!
//! The [`memory`] module provides implementations of all of them.

use std::sync::Arc;

mod client;
pub mod memory;
mod session;
mod token;

pub use client::{ClientApplicationStore, UserAccountStore};
pub use memory::MemoryBackend;
pub use session::SessionStore;
pub use token::{AccessTokenStore, KeyStore, UserClaimStore};

/// The set of stores the processors operate on.
#[derive(Clone)]
pub struct Stores {
    /// Client registry.
    pub clients: Arc<dyn ClientApplicationStore>,
    /// User directory.
    pub users: Arc<dyn UserAccountStore>,
    /// Sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// Access tokens.
    pub access_tokens: Arc<dyn AccessTokenStore>,
    /// Signing keys.
    pub keys: Arc<dyn KeyStore>,
    /// Claim release table.
    pub claims: Arc<dyn UserClaimStore>,
}
