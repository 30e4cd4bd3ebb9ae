//! In-memory store implementations.
//!
//! Backed by [`DashMap`]. Each compare-and-set style operation runs while
//! holding the map's entry guard, which makes it atomic for that record.
//! Nothing is persisted; these stores suit tests, demos and single-node
//! deployments that accept losing pending requests on restart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{
    AccessTokenStore, ClientApplicationStore, KeyStore, SessionStore, Stores, UserAccountStore,
    UserClaimStore,
};
use crate::error::CibaError;
use crate::session::{CibaSession, Consent};
use crate::types::{AccessToken, ClientApplication, SigningKey, UserAccount};
use crate::{CibaResult, scope};

// ============================================================================
// Clients and users
// ============================================================================

/// In-memory client registry.
#[derive(Debug, Default)]
pub struct MemoryClientStore {
    clients: DashMap<String, ClientApplication>,
}

impl MemoryClientStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn insert(&self, client: ClientApplication) {
        self.clients.insert(client.id.clone(), client);
    }
}

#[async_trait]
impl ClientApplicationStore for MemoryClientStore {
    async fn find_by_id(&self, client_id: &str) -> CibaResult<Option<ClientApplication>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserAccount>,
}

impl MemoryUserStore {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub fn insert(&self, user: UserAccount) {
        self.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserAccountStore for MemoryUserStore {
    async fn find_by_hint(&self, hint: &str) -> CibaResult<Option<UserAccount>> {
        Ok(self.users.get(hint).map(|u| u.value().clone()))
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, CibaSession>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions whose lifetime elapsed before `now`.
    ///
    /// Returns the number of removed sessions.
    pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_time_expired_at(now));
        before - self.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &CibaSession) -> CibaResult<()> {
        match self.sessions.entry(session.auth_req_id.clone()) {
            Entry::Occupied(_) => Err(CibaError::storage("auth_req_id already exists")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, auth_req_id: &str) -> CibaResult<Option<CibaSession>> {
        Ok(self.sessions.get(auth_req_id).map(|s| s.value().clone()))
    }

    async fn delete(&self, auth_req_id: &str) -> CibaResult<bool> {
        Ok(self.sessions.remove(auth_req_id).is_some())
    }

    async fn record_consent(
        &self,
        auth_req_id: &str,
        consent: Consent,
        now: OffsetDateTime,
    ) -> CibaResult<Option<CibaSession>> {
        let Some(mut session) = self.sessions.get_mut(auth_req_id) else {
            return Ok(None);
        };
        if session.record_consent(consent, now) {
            Ok(Some(session.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn try_mark_polled(
        &self,
        auth_req_id: &str,
        now: OffsetDateTime,
        interval: Duration,
    ) -> CibaResult<bool> {
        Ok(self
            .sessions
            .get_mut(auth_req_id)
            .is_some_and(|mut session| session.try_mark_polled(now, interval)))
    }

    async fn consume(
        &self,
        auth_req_id: &str,
        id_token: &str,
        now: OffsetDateTime,
    ) -> CibaResult<bool> {
        Ok(self
            .sessions
            .get_mut(auth_req_id)
            .is_some_and(|mut session| session.consume(id_token, now)))
    }
}

// ============================================================================
// Tokens, keys and claims
// ============================================================================

/// In-memory access token store.
#[derive(Debug, Default)]
pub struct MemoryAccessTokenStore {
    tokens: DashMap<String, AccessToken>,
}

impl MemoryAccessTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AccessTokenStore for MemoryAccessTokenStore {
    async fn create(&self, token: &AccessToken) -> CibaResult<()> {
        match self.tokens.entry(token.value.clone()) {
            Entry::Occupied(_) => Err(CibaError::storage("access token value collision")),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, value: &str) -> CibaResult<Option<AccessToken>> {
        Ok(self.tokens.get(value).map(|t| t.value().clone()))
    }

    async fn find_by_client_and_user(
        &self,
        client_id: &str,
        user_id: &str,
    ) -> CibaResult<Vec<AccessToken>> {
        Ok(self
            .tokens
            .iter()
            .filter(|t| t.client_id == client_id && t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect())
    }
}

/// In-memory signing key store, one key per client.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: DashMap<String, SigningKey>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the key for its client, replacing any previous one.
    pub fn insert(&self, key: SigningKey) {
        self.keys.insert(key.client_id.clone(), key);
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn find_private_key_by_client_id(
        &self,
        client_id: &str,
    ) -> CibaResult<Option<SigningKey>> {
        Ok(self.keys.get(client_id).map(|k| k.value().clone()))
    }
}

/// In-memory claim release table.
///
/// Maps each scope to the claim names it releases and each user to their
/// claim values.
#[derive(Debug, Default)]
pub struct MemoryUserClaimStore {
    scope_claims: DashMap<String, Vec<String>>,
    user_claims: DashMap<String, Map<String, Value>>,
}

impl MemoryUserClaimStore {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the claims released by a scope.
    pub fn define_scope<I, S>(&self, scope: impl Into<String>, claims: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope_claims
            .insert(scope.into(), claims.into_iter().map(Into::into).collect());
    }

    /// Sets one claim value of a user.
    pub fn set_claim(&self, user_id: impl Into<String>, name: impl Into<String>, value: Value) {
        self.user_claims
            .entry(user_id.into())
            .or_default()
            .insert(name.into(), value);
    }
}

#[async_trait]
impl UserClaimStore for MemoryUserClaimStore {
    async fn get_user_claims(&self, user_id: &str, scope: &str) -> CibaResult<Map<String, Value>> {
        let mut released = Map::new();
        let Some(values) = self.user_claims.get(user_id) else {
            return Ok(released);
        };

        for scope_name in scope::parse(scope) {
            if let Some(names) = self.scope_claims.get(scope_name) {
                for name in names.iter() {
                    if let Some(value) = values.get(name) {
                        released.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        Ok(released)
    }
}

// ============================================================================
// Backend bundle
// ============================================================================

/// All in-memory stores, with typed handles for seeding data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    /// Client registry.
    pub clients: Arc<MemoryClientStore>,
    /// User directory.
    pub users: Arc<MemoryUserStore>,
    /// Sessions.
    pub sessions: Arc<MemorySessionStore>,
    /// Access tokens.
    pub access_tokens: Arc<MemoryAccessTokenStore>,
    /// Signing keys.
    pub keys: Arc<MemoryKeyStore>,
    /// Claim release table.
    pub claims: Arc<MemoryUserClaimStore>,
}

impl MemoryBackend {
    /// Creates empty stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stores as trait objects for the processors.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores {
            clients: self.clients.clone(),
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            access_tokens: self.access_tokens.clone(),
            keys: self.keys.clone(),
            claims: self.claims.clone(),
        }
    }
}
