//! Backchannel authentication sessions.
//!
//! A session is the server-side record behind an `auth_req_id`. It is
//! created when an authentication request is accepted and tracks the
//! end-user's decision until tokens are issued or the request lapses.
//!
//! # Lifecycle
//!
//! ```text
//!            record_consent(true)            consume()
//! Pending ------------------------> Consented ---------> Consumed
//!    |
//!    +---- record_consent(false) --> Denied
//! ```
//!
//! `Expired` is never stored: it is derived at read time whenever the
//! session was invalidated or `created_at + expires_in` has passed.
//!
//! # Security
//!
//! - `auth_req_id` carries 512 bits of randomness
//! - consent is decided at most once
//! - a session yields tokens at most once

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The end-user's decision on a backchannel authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    /// No decision yet.
    #[default]
    Pending,
    /// The end-user approved the request.
    Granted,
    /// The end-user rejected the request.
    Denied,
}

impl Consent {
    /// Maps a consent callback decision.
    #[must_use]
    pub fn from_decision(consented: bool) -> Self {
        if consented { Self::Granted } else { Self::Denied }
    }

    /// Returns `true` while no decision was recorded.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Observable state of a session at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the end-user.
    Pending,
    /// Approved, tokens not yet issued.
    Consented,
    /// Rejected by the end-user.
    Denied,
    /// Tokens were issued.
    Consumed,
    /// Invalidated or past its expiry.
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Consented => "consented",
            Self::Denied => "denied",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// A backchannel authentication request tracked by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CibaSession {
    /// Opaque request identifier returned to the client.
    pub auth_req_id: String,

    /// Client that created the request.
    pub client_id: String,

    /// End-user the request was made for (the resolved login hint).
    pub user_id: String,

    /// Message shown on both devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_message: Option<String>,

    /// Bearer token the server presents when calling the client back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_notification_token: Option<String>,

    /// Requested scopes (space-separated).
    pub scope: String,

    /// Lifetime in seconds, counted from `created_at`.
    pub expires_in: u64,

    /// Minimum seconds between token requests. Only set for `poll` clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Cleared once tokens are issued or the session is expired explicitly.
    pub valid: bool,

    /// The end-user's decision.
    #[serde(default)]
    pub consent: Consent,

    /// ID token issued for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Time of the last accepted poll.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub latest_token_requested_at: Option<OffsetDateTime>,

    /// Creation time (UTC).
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CibaSession {
    /// Creates a pending session with a fresh `auth_req_id`.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        scope: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        Self {
            auth_req_id: Self::generate_auth_req_id(),
            client_id: client_id.into(),
            user_id: user_id.into(),
            binding_message: None,
            client_notification_token: None,
            scope: scope.into(),
            expires_in: expires_in.as_secs(),
            interval: None,
            valid: true,
            consent: Consent::Pending,
            id_token: None,
            latest_token_requested_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the binding message.
    #[must_use]
    pub fn with_binding_message(mut self, message: Option<String>) -> Self {
        self.binding_message = message;
        self
    }

    /// Sets the client notification token.
    #[must_use]
    pub fn with_notification_token(mut self, token: Option<String>) -> Self {
        self.client_notification_token = token;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval.as_secs());
        self
    }

    /// Generates a new request identifier.
    ///
    /// 512 bits from the thread-local CSPRNG, base64url without padding.
    #[must_use]
    pub fn generate_auth_req_id() -> String {
        let mut bytes = [0u8; 64];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Absolute expiry time, `None` if it lies beyond the representable range.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let lifetime = time::Duration::try_from(Duration::from_secs(self.expires_in)).ok()?;
        self.created_at.checked_add(lifetime)
    }

    /// Forces the session invalid.
    pub fn expire(&mut self) {
        self.valid = false;
    }

    /// Returns `true` if the lifetime has elapsed.
    #[must_use]
    pub fn is_time_expired(&self) -> bool {
        self.is_time_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the lifetime has elapsed at `now`.
    #[must_use]
    pub fn is_time_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    /// Returns `true` if the end-user approved the request.
    #[must_use]
    pub fn is_consented(&self) -> bool {
        self.consent == Consent::Granted
    }

    /// Returns `true` while no decision was recorded.
    #[must_use]
    pub fn is_authorization_pending(&self) -> bool {
        self.consent.is_pending()
    }

    /// Returns `true` if the session can still be acted on.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the session can still be acted on at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.valid && !self.is_time_expired_at(now)
    }

    /// Remaining lifetime at `now`, zero once expired.
    #[must_use]
    pub fn time_remaining(&self, now: OffsetDateTime) -> Duration {
        let Some(at) = self.expires_at() else {
            return Duration::MAX;
        };
        let remaining = at - now;
        if remaining.is_negative() {
            Duration::ZERO
        } else {
            remaining.unsigned_abs()
        }
    }

    /// Derives the state at `now`.
    #[must_use]
    pub fn state_at(&self, now: OffsetDateTime) -> SessionState {
        if !self.valid && self.id_token.is_some() {
            return SessionState::Consumed;
        }
        if !self.is_valid_at(now) {
            return SessionState::Expired;
        }
        match self.consent {
            Consent::Pending => SessionState::Pending,
            Consent::Granted => SessionState::Consented,
            Consent::Denied => SessionState::Denied,
        }
    }

    /// Applies the end-user's decision.
    ///
    /// Returns `false` and leaves the session untouched unless it is still
    /// pending and valid at `now`.
    pub fn record_consent(&mut self, consent: Consent, now: OffsetDateTime) -> bool {
        if consent.is_pending() || !self.consent.is_pending() || !self.is_valid_at(now) {
            return false;
        }
        self.consent = consent;
        true
    }

    /// Accepts a poll at `now` if `interval` has passed since the last one.
    ///
    /// Returns `false` (throttled) otherwise. The poll timestamp never moves
    /// backwards.
    pub fn try_mark_polled(&mut self, now: OffsetDateTime, interval: Duration) -> bool {
        if let Some(last) = self.latest_token_requested_at {
            if now < last || now - last < interval {
                return false;
            }
        }
        self.latest_token_requested_at = Some(now);
        true
    }

    /// Marks the session as redeemed, storing the issued ID token.
    ///
    /// Returns `false` unless the session is consented and still valid at `now`.
    pub fn consume(&mut self, id_token: impl Into<String>, now: OffsetDateTime) -> bool {
        if !self.is_consented() || !self.is_valid_at(now) {
            return false;
        }
        self.expire();
        self.id_token = Some(id_token.into());
        true
    }
}

#[cfg(test)]
pub(crate) fn create_test_session(client_id: &str, user_id: &str) -> CibaSession {
    CibaSession::new(client_id, user_id, "openid", Duration::from_secs(120))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_req_id_generation() {
        let id = CibaSession::generate_auth_req_id();
        // 64 bytes base64url without padding
        assert_eq!(id.len(), 86);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(id, CibaSession::generate_auth_req_id());
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = create_test_session("client", "alice");
        assert!(session.is_valid());
        assert!(session.is_authorization_pending());
        assert!(!session.is_consented());
        assert_eq!(
            session.state_at(OffsetDateTime::now_utc()),
            SessionState::Pending
        );
    }

    #[test]
    fn test_consent_recorded_once() {
        let now = OffsetDateTime::now_utc();
        let mut session = create_test_session("client", "alice");

        assert!(session.record_consent(Consent::Granted, now));
        assert!(session.is_consented());
        assert!(!session.record_consent(Consent::Denied, now));
        assert_eq!(session.consent, Consent::Granted);
    }

    #[test]
    fn test_pending_is_not_a_decision() {
        let mut session = create_test_session("client", "alice");
        assert!(!session.record_consent(Consent::Pending, OffsetDateTime::now_utc()));
    }

    #[test]
    fn test_consent_rejected_after_expiry() {
        let mut session = create_test_session("client", "alice");
        let later = session.created_at + Duration::from_secs(121);
        assert!(session.is_time_expired_at(later));
        assert!(!session.record_consent(Consent::Granted, later));
        assert_eq!(session.state_at(later), SessionState::Expired);
    }

    #[test]
    fn test_expire_makes_session_invalid() {
        let mut session = create_test_session("client", "alice");
        session.expire();
        assert!(!session.is_valid());
        assert_eq!(
            session.state_at(OffsetDateTime::now_utc()),
            SessionState::Expired
        );
    }

    #[test]
    fn test_consume_requires_consent() {
        let now = OffsetDateTime::now_utc();
        let mut session = create_test_session("client", "alice");
        assert!(!session.consume("id-token", now));

        session.record_consent(Consent::Granted, now);
        assert!(session.consume("id-token", now));
        assert!(!session.valid);
        assert_eq!(session.id_token.as_deref(), Some("id-token"));
        assert_eq!(session.state_at(now), SessionState::Consumed);

        // single use
        assert!(!session.consume("second", now));
        assert_eq!(session.id_token.as_deref(), Some("id-token"));
    }

    #[test]
    fn test_denied_session_cannot_be_consumed() {
        let now = OffsetDateTime::now_utc();
        let mut session = create_test_session("client", "alice");
        session.record_consent(Consent::Denied, now);
        assert_eq!(session.state_at(now), SessionState::Denied);
        assert!(!session.consume("id-token", now));
    }

    #[test]
    fn test_poll_throttling() {
        let start = OffsetDateTime::now_utc();
        let interval = Duration::from_secs(5);
        let mut session = create_test_session("client", "alice");

        assert!(session.try_mark_polled(start, interval));
        assert!(!session.try_mark_polled(start + Duration::from_secs(2), interval));
        assert_eq!(session.latest_token_requested_at, Some(start));
        assert!(session.try_mark_polled(start + Duration::from_secs(5), interval));
        // never moves backwards
        assert!(!session.try_mark_polled(start, Duration::ZERO));
    }

    #[test]
    fn test_time_remaining() {
        let session = create_test_session("client", "alice");
        let now = session.created_at + Duration::from_secs(20);
        assert_eq!(session.time_remaining(now), Duration::from_secs(100));
        let later = session.created_at + Duration::from_secs(500);
        assert_eq!(session.time_remaining(later), Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_expiry_never_panics() {
        let now = OffsetDateTime::now_utc();
        let mut session = create_test_session("client", "alice");
        session.expires_in = u64::MAX / 2;

        assert!(session.expires_at().is_none());
        assert!(session.is_valid_at(now));
        assert_eq!(session.time_remaining(now), Duration::MAX);
        assert_eq!(session.state_at(now), SessionState::Pending);
    }

    #[test]
    fn test_serde_roundtrip_keeps_state() {
        let now = OffsetDateTime::now_utc();
        let mut session = create_test_session("client", "alice")
            .with_poll_interval(Duration::from_secs(5))
            .with_binding_message(Some("W4SCT".to_string()));
        session.record_consent(Consent::Denied, now);
        session.try_mark_polled(now, Duration::from_secs(5));

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"consent\":\"denied\""));
        let parsed: CibaSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.auth_req_id, session.auth_req_id);
        assert_eq!(parsed.consent, Consent::Denied);
        assert_eq!(parsed.interval, Some(5));
        assert!(parsed.latest_token_requested_at.is_some());
    }
}
