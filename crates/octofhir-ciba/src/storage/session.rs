//! Session storage trait.
//!
//! # Atomicity
//!
//! The CIBA processors never hold a lock across store calls. Every
//! state transition is therefore a single store method that must be atomic
//! for its own record:
//!
//! - [`SessionStore::record_consent`] is a compare-and-set from pending
//! - [`SessionStore::try_mark_polled`] checks and advances the poll timestamp
//! - [`SessionStore::consume`] redeems the session exactly once
//!
//! Backends without native compare-and-set (SQL, key-value) should use a
//! conditional update (`UPDATE ... WHERE consent = 'pending'`) or an
//! optimistic version check to implement them.

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::CibaResult;
use crate::session::{CibaSession, Consent};

/// Storage trait for backchannel authentication sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored or the
    /// `auth_req_id` already exists.
    async fn create(&self, session: &CibaSession) -> CibaResult<()>;

    /// Finds a session by `auth_req_id`.
    ///
    /// Returns sessions regardless of their state; callers check validity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, auth_req_id: &str) -> CibaResult<Option<CibaSession>>;

    /// Removes a session. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, auth_req_id: &str) -> CibaResult<bool>;

    /// Records the end-user's decision if the session is still pending and
    /// valid at `now`.
    ///
    /// # Returns
    ///
    /// The updated session, or `None` if the session does not exist or a
    /// decision can no longer be recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record_consent(
        &self,
        auth_req_id: &str,
        consent: Consent,
        now: OffsetDateTime,
    ) -> CibaResult<Option<CibaSession>>;

    /// Records a poll at `now` unless the previous one is less than
    /// `interval` ago.
    ///
    /// # Returns
    ///
    /// `true` if the poll was recorded, `false` if it was throttled or the
    /// session does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn try_mark_polled(
        &self,
        auth_req_id: &str,
        now: OffsetDateTime,
        interval: Duration,
    ) -> CibaResult<bool>;

    /// Redeems a consented session, storing its ID token and clearing
    /// `valid`.
    ///
    /// # Returns
    ///
    /// `true` for exactly one caller per session; `false` if the session is
    /// missing, not consented, expired or already redeemed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(
        &self,
        auth_req_id: &str,
        id_token: &str,
        now: OffsetDateTime,
    ) -> CibaResult<bool>;
}
