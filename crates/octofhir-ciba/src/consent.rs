//! Consent decision processing.
//!
//! The end-user's authentication device reports the decision for an
//! `auth_req_id`. The decision is recorded once; what happens next depends
//! on the client's delivery mode:
//!
//! | Mode | Decision | Side effect |
//! |------|----------|-------------|
//! | push | granted  | tokens minted, session redeemed, tokens pushed to the client |
//! | push | denied   | `access_denied` pushed to the client |
//! | ping | either   | ping callback carrying only `auth_req_id` |
//! | poll | either   | none |
//!
//! Callback failures are logged and never undo the recorded decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::CibaResult;
use crate::error::CibaError;
use crate::notify::{CallbackPayload, ClientNotification, ClientNotifier};
use crate::session::{CibaSession, Consent};
use crate::storage::{ClientApplicationStore, SessionStore, Stores};
use crate::token::TokenIssuer;
use crate::types::{ClientApplication, DeliveryMode};

/// The end-user's decision on a backchannel authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    /// Request being decided.
    pub auth_req_id: String,

    /// `true` if the end-user approved.
    pub consented: bool,
}

impl ConsentRequest {
    /// Creates a decision for `auth_req_id`.
    #[must_use]
    pub fn new(auth_req_id: impl Into<String>, consented: bool) -> Self {
        Self {
            auth_req_id: auth_req_id.into(),
            consented,
        }
    }
}

/// Applies consent decisions.
#[derive(Clone)]
pub struct ConsentProcessor {
    clients: Arc<dyn ClientApplicationStore>,
    sessions: Arc<dyn SessionStore>,
    client_notifier: Arc<dyn ClientNotifier>,
    issuer: TokenIssuer,
}

impl ConsentProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        stores: &Stores,
        client_notifier: Arc<dyn ClientNotifier>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            clients: stores.clients.clone(),
            sessions: stores.sessions.clone(),
            client_notifier,
            issuer,
        }
    }

    /// Records the decision and runs the delivery-mode side effects.
    ///
    /// # Errors
    ///
    /// - `transaction_failed` if the session does not exist
    /// - `invalid_client` if the owning client is gone
    /// - `expired_token` if the session is expired, used or already decided
    /// - token issuance errors for granted push requests
    pub async fn process(&self, request: &ConsentRequest) -> CibaResult<()> {
        let session = self
            .sessions
            .find_by_id(&request.auth_req_id)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Consent for unknown auth_req_id");
                CibaError::transaction_failed("Unknown auth_req_id")
            })?;

        let client = self
            .clients
            .find_by_id(&session.client_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %session.client_id, "Consent for session of unknown client");
                CibaError::invalid_client("Client no longer registered")
            })?;

        let now = OffsetDateTime::now_utc();
        let decision = Consent::from_decision(request.consented);

        let recorded = if session.is_valid_at(now) && session.consent.is_pending() {
            self.sessions
                .record_consent(&session.auth_req_id, decision, now)
                .await?
        } else {
            None
        };

        let Some(session) = recorded else {
            tracing::debug!(
                client_id = %client.id,
                state = %session.state_at(now),
                "Consent for session that is no longer pending"
            );
            let err = CibaError::expired_token("auth_req_id expired or already decided");
            if client.token_mode == DeliveryMode::Push {
                self.push_error(&client, &session, &err).await;
            }
            return Err(err);
        };

        tracing::info!(
            client_id = %client.id,
            user_id = %session.user_id,
            consent = ?decision,
            mode = %client.token_mode,
            "Recorded consent decision"
        );

        match (client.token_mode, decision) {
            (DeliveryMode::Push, Consent::Granted) => match self.issuer.issue(&session).await {
                Ok(tokens) => {
                    let payload = CallbackPayload::PushSuccess {
                        auth_req_id: session.auth_req_id.clone(),
                        tokens,
                    };
                    self.notify(&client, &session, payload).await;
                }
                Err(err) => {
                    tracing::warn!(client_id = %client.id, error = %err, "Push token issuance failed");
                    self.push_error(&client, &session, &err).await;
                    return Err(err);
                }
            },
            (DeliveryMode::Push, _) => {
                let err = CibaError::access_denied("End-user denied the request");
                self.push_error(&client, &session, &err).await;
            }
            (DeliveryMode::Ping, _) => {
                let payload = CallbackPayload::Ping {
                    auth_req_id: session.auth_req_id.clone(),
                };
                self.notify(&client, &session, payload).await;
            }
            (DeliveryMode::Poll, _) => {}
        }

        Ok(())
    }

    async fn push_error(&self, client: &ClientApplication, session: &CibaSession, err: &CibaError) {
        let payload = CallbackPayload::PushError {
            auth_req_id: session.auth_req_id.clone(),
            error: err.to_response(),
        };
        self.notify(client, session, payload).await;
    }

    async fn notify(&self, client: &ClientApplication, session: &CibaSession, payload: CallbackPayload) {
        let Some(endpoint) = client.client_notification_endpoint.clone() else {
            tracing::warn!(client_id = %client.id, "No client notification endpoint registered");
            return;
        };

        let notification = ClientNotification {
            token_method: client.token_mode,
            endpoint,
            client_notification_token: session.client_notification_token.clone().unwrap_or_default(),
            payload,
        };

        if let Err(e) = self.client_notifier.notify_client(&notification).await {
            tracing::error!(
                client_id = %client.id,
                mode = %client.token_mode,
                success = notification.success(),
                error = %e,
                "Client callback failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CibaConfig;
    use crate::notify::InMemoryNotifier;
    use crate::session::SessionState;
    use crate::storage::MemoryBackend;
    use crate::token::JwtSigner;
    use crate::types::SigningKey;
    use std::time::Duration;

    struct Fixture {
        backend: MemoryBackend,
        notifier: Arc<InMemoryNotifier>,
        processor: ConsentProcessor,
    }

    fn fixture() -> Fixture {
        let backend = MemoryBackend::new();
        let notifier = Arc::new(InMemoryNotifier::new());
        let stores = backend.stores();
        let issuer = TokenIssuer::new(&stores, Arc::new(JwtSigner::new()), &CibaConfig::default());
        let processor = ConsentProcessor::new(&stores, notifier.clone(), issuer);
        Fixture {
            backend,
            notifier,
            processor,
        }
    }

    async fn session_for(f: &Fixture, mode: DeliveryMode) -> (ClientApplication, CibaSession) {
        let client = ClientApplication::new("app", "openid", mode)
            .with_notification_endpoint("https://client.example.com/cb");
        f.backend.clients.insert(client.clone());
        f.backend
            .keys
            .insert(SigningKey::hmac(&client.id, "HS256", "consent-test-secret"));

        let session = CibaSession::new(&client.id, "alice", "openid", Duration::from_secs(120))
            .with_notification_token(Some("cb-token".to_string()));
        f.backend.sessions.create(&session).await.unwrap();
        (client, session)
    }

    async fn stored(f: &Fixture, id: &str) -> CibaSession {
        f.backend.sessions.find_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        let err = f
            .processor
            .process(&ConsentRequest::new("missing", true))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "transaction_failed");
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let f = fixture();
        let session = CibaSession::new("ghost", "alice", "openid", Duration::from_secs(120));
        f.backend.sessions.create(&session).await.unwrap();

        let err = f
            .processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn test_poll_consent_has_no_side_effects() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Poll).await;

        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap();

        let s = stored(&f, &session.auth_req_id).await;
        assert_eq!(s.consent, Consent::Granted);
        assert!(s.valid);
        assert!(f.notifier.client_notifications().is_empty());
        assert!(f.backend.access_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_second_consent_is_expired_token() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Poll).await;
        let request = ConsentRequest::new(&session.auth_req_id, true);

        f.processor.process(&request).await.unwrap();
        let err = f
            .processor
            .process(&ConsentRequest::new(&session.auth_req_id, false))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "expired_token");
        assert_eq!(stored(&f, &session.auth_req_id).await.consent, Consent::Granted);
    }

    #[tokio::test]
    async fn test_ping_sends_auth_req_id() {
        let f = fixture();
        let (client, session) = session_for(&f, DeliveryMode::Ping).await;

        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, false))
            .await
            .unwrap();

        let sent = f.notifier.client_notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token_method, DeliveryMode::Ping);
        assert_eq!(sent[0].endpoint, client.client_notification_endpoint.unwrap());
        assert_eq!(sent[0].client_notification_token, "cb-token");
        assert_eq!(
            sent[0].payload,
            CallbackPayload::Ping {
                auth_req_id: session.auth_req_id.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_push_grant_delivers_tokens() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Push).await;

        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap();

        let s = stored(&f, &session.auth_req_id).await;
        assert_eq!(s.state_at(OffsetDateTime::now_utc()), SessionState::Consumed);
        assert_eq!(f.backend.access_tokens.len(), 1);

        let sent = f.notifier.client_notifications();
        assert_eq!(sent.len(), 1);
        match &sent[0].payload {
            CallbackPayload::PushSuccess { auth_req_id, tokens } => {
                assert_eq!(auth_req_id, &session.auth_req_id);
                assert_eq!(tokens.token_type, "bearer");
                assert_eq!(s.id_token.as_deref(), Some(tokens.id_token.as_str()));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_denial_sends_access_denied_without_tokens() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Push).await;

        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, false))
            .await
            .unwrap();

        assert!(f.backend.access_tokens.is_empty());
        let sent = f.notifier.client_notifications();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].success());
        assert_eq!(sent[0].payload.body()["error"], "access_denied");
    }

    #[tokio::test]
    async fn test_push_expired_session_sends_failed_callback() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Push).await;
        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, false))
            .await
            .unwrap();

        let err = f
            .processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "expired_token");

        let sent = f.notifier.client_notifications();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload.body()["error"], "expired_token");
    }

    #[tokio::test]
    async fn test_callback_failure_keeps_consent() {
        let f = fixture();
        let (_, session) = session_for(&f, DeliveryMode::Ping).await;
        f.notifier.set_failing(true);

        f.processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap();
        assert_eq!(stored(&f, &session.auth_req_id).await.consent, Consent::Granted);
    }

    #[tokio::test]
    async fn test_consent_after_expiry() {
        let f = fixture();
        let client = ClientApplication::new("app", "openid", DeliveryMode::Poll);
        f.backend.clients.insert(client.clone());
        let mut session = CibaSession::new(&client.id, "alice", "openid", Duration::from_secs(60));
        session.created_at -= Duration::from_secs(120);
        f.backend.sessions.create(&session).await.unwrap();

        let err = f
            .processor
            .process(&ConsentRequest::new(&session.auth_req_id, true))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "expired_token");
    }
}
