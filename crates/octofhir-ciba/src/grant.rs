//! CIBA token grant (`urn:openid:params:grant-type:ciba`).
//!
//! # Flow
//!
//! 1. `grant_type` must be the CIBA identifier
//! 2. the client authenticates
//! 3. the `auth_req_id` exists and belongs to that client
//! 4. the client is registered for the CIBA grant
//! 5. dispatch on the client's delivery mode:
//!    - `push`: tokens are never fetched, always `unauthorized_client`
//!    - `ping`: answer from the current session state
//!    - `poll`: throttle, then wait a bounded time for the user's decision
//! 6. issue tokens for a consented session
//!
//! # Poll throttling
//!
//! A poll is accepted only if the previous accepted poll is at least the
//! session's interval ago. The check and the timestamp update are one
//! [`SessionStore::try_mark_polled`] call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::CibaResult;
use crate::client_auth::{ClientAuthenticator, ClientCredentials};
use crate::config::SessionConfig;
use crate::error::CibaError;
use crate::session::{CibaSession, Consent};
use crate::storage::{ClientApplicationStore, SessionStore, Stores};
use crate::token::{TokenIssuer, TokenResponse};
use crate::types::{CIBA_GRANT_TYPE, DeliveryMode};

/// A token request for the CIBA grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Must be `urn:openid:params:grant-type:ciba`.
    pub grant_type: String,

    /// Request to redeem.
    #[serde(default)]
    pub auth_req_id: Option<String>,
}

impl TokenRequest {
    /// Creates a CIBA token request for `auth_req_id`.
    #[must_use]
    pub fn ciba(auth_req_id: impl Into<String>) -> Self {
        Self {
            grant_type: CIBA_GRANT_TYPE.to_string(),
            auth_req_id: Some(auth_req_id.into()),
        }
    }
}

// ============================================================================
// Consent wait
// ============================================================================

/// Result of waiting for the end-user's decision.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// Consent granted; carries the session as last read.
    Granted(CibaSession),
    /// The end-user denied the request.
    Denied,
    /// The session expired, was redeemed or disappeared.
    Expired,
    /// No decision before the wait ended.
    Pending,
}

/// Classifies a session that needs no further waiting.
///
/// Returns `None` while the session is valid and undecided.
#[must_use]
pub fn terminal_outcome(session: &CibaSession, now: OffsetDateTime) -> Option<WaitOutcome> {
    if !session.is_valid_at(now) {
        return Some(WaitOutcome::Expired);
    }
    match session.consent {
        Consent::Pending => None,
        Consent::Denied => Some(WaitOutcome::Denied),
        Consent::Granted => Some(WaitOutcome::Granted(session.clone())),
    }
}

/// Waits for a session to reach a terminal state.
///
/// Implementations must return once the session is terminal or their own
/// deadline has passed.
#[async_trait]
pub trait ConsentWaiter: Send + Sync {
    /// Waits for the decision on `auth_req_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    async fn wait_for_consent(&self, auth_req_id: &str) -> CibaResult<WaitOutcome>;
}

/// Re-reads the session from the store at a fixed step until it is terminal
/// or the timeout elapses.
#[derive(Clone)]
pub struct StorePollingWaiter {
    sessions: Arc<dyn SessionStore>,
    step: Duration,
    timeout: Duration,
}

impl StorePollingWaiter {
    /// Creates a waiter.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, step: Duration, timeout: Duration) -> Self {
        Self {
            sessions,
            step,
            timeout,
        }
    }

    async fn check(&self, auth_req_id: &str) -> CibaResult<Option<WaitOutcome>> {
        Ok(match self.sessions.find_by_id(auth_req_id).await? {
            Some(session) => terminal_outcome(&session, OffsetDateTime::now_utc()),
            None => Some(WaitOutcome::Expired),
        })
    }
}

#[async_trait]
impl ConsentWaiter for StorePollingWaiter {
    async fn wait_for_consent(&self, auth_req_id: &str) -> CibaResult<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        if let Some(outcome) = self.check(auth_req_id).await? {
            return Ok(outcome);
        }

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.step).await;
            if let Some(outcome) = self.check(auth_req_id).await? {
                return Ok(outcome);
            }
        }

        Ok(WaitOutcome::Pending)
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Processes token requests of the CIBA grant.
#[derive(Clone)]
pub struct TokenGrantProcessor {
    clients: Arc<dyn ClientApplicationStore>,
    sessions: Arc<dyn SessionStore>,
    authenticator: ClientAuthenticator,
    issuer: TokenIssuer,
    waiter: Arc<dyn ConsentWaiter>,
    poll_interval: Duration,
}

impl TokenGrantProcessor {
    /// Creates a processor that waits by re-reading the session store.
    #[must_use]
    pub fn new(
        stores: &Stores,
        authenticator: ClientAuthenticator,
        issuer: TokenIssuer,
        config: &SessionConfig,
    ) -> Self {
        let waiter = StorePollingWaiter::new(
            stores.sessions.clone(),
            config.consent_poll_step,
            config.consent_wait_timeout,
        );
        Self {
            clients: stores.clients.clone(),
            sessions: stores.sessions.clone(),
            authenticator,
            issuer,
            waiter: Arc::new(waiter),
            poll_interval: config.poll_interval,
        }
    }

    /// Replaces the consent wait strategy.
    #[must_use]
    pub fn with_waiter(mut self, waiter: Arc<dyn ConsentWaiter>) -> Self {
        self.waiter = waiter;
        self
    }

    /// Handles a token request.
    ///
    /// # Errors
    ///
    /// Returns the OAuth error for the request; `authorization_pending`,
    /// `slow_down`, `access_denied` and `expired_token` are regular answers
    /// while the end-user has not approved.
    pub async fn process(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> CibaResult<TokenResponse> {
        // 1. Grant type
        if request.grant_type != CIBA_GRANT_TYPE {
            tracing::debug!(grant_type = %request.grant_type, "Unsupported grant type");
            return Err(CibaError::unsupported_grant_type(&request.grant_type));
        }

        // 2. Client authentication
        let client_id = credentials
            .claimed_client_id()
            .ok_or_else(|| CibaError::invalid_client("Client not identified"))?;
        let client = self
            .clients
            .find_by_id(&client_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %client_id, "Token request from unknown client");
                CibaError::invalid_client("Unknown client")
            })?;
        if !self.authenticator.authenticate(credentials, &client) {
            tracing::warn!(client_id = %client.id, "Client authentication failed");
            return Err(CibaError::invalid_client("Client authentication failed"));
        }

        // 3. Session owned by the client
        let auth_req_id = request
            .auth_req_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CibaError::invalid_request("auth_req_id is required"))?;
        let session = match self.sessions.find_by_id(auth_req_id).await? {
            Some(session) if session.client_id == client.id => session,
            Some(_) => {
                tracing::warn!(client_id = %client.id, "auth_req_id belongs to another client");
                return Err(CibaError::invalid_grant("Unknown auth_req_id"));
            }
            None => {
                tracing::debug!(client_id = %client.id, "Unknown auth_req_id");
                return Err(CibaError::invalid_grant("Unknown auth_req_id"));
            }
        };

        // 4. Registered for CIBA
        if !client.is_registered_for_ciba() {
            tracing::warn!(client_id = %client.id, "Client not registered for the CIBA grant");
            return Err(CibaError::unauthorized_client(
                "Client not registered for the CIBA grant",
            ));
        }

        // 5. Delivery mode
        let outcome = match client.token_mode {
            DeliveryMode::Push => {
                tracing::debug!(client_id = %client.id, "Push client called the token endpoint");
                return Err(CibaError::unauthorized_client(
                    "Push mode clients receive tokens at their notification endpoint",
                ));
            }
            DeliveryMode::Ping => terminal_outcome(&session, OffsetDateTime::now_utc())
                .unwrap_or(WaitOutcome::Pending),
            DeliveryMode::Poll => {
                let interval = session
                    .interval
                    .map_or(self.poll_interval, Duration::from_secs);
                let accepted = self
                    .sessions
                    .try_mark_polled(&session.auth_req_id, OffsetDateTime::now_utc(), interval)
                    .await?;
                if !accepted {
                    tracing::debug!(client_id = %client.id, "Polling faster than interval");
                    return Err(CibaError::SlowDown);
                }
                self.waiter.wait_for_consent(&session.auth_req_id).await?
            }
        };

        // 6. Issue
        match outcome {
            WaitOutcome::Granted(session) => self.issuer.issue(&session).await,
            WaitOutcome::Pending => Err(CibaError::AuthorizationPending),
            WaitOutcome::Denied => Err(CibaError::access_denied("End-user denied the request")),
            WaitOutcome::Expired => Err(CibaError::expired_token(
                "auth_req_id expired or already used",
            )),
        }
    }
}
