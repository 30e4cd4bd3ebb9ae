//! Backchannel authentication endpoint processing.
//!
//! A client asks the server to authenticate an end-user on a separate
//! device. The request is validated in a fixed order and the first failing
//! check decides the error:
//!
//! | # | Check | Error |
//! |---|-------|-------|
//! | 1 | client exists | `unauthorized_client` |
//! | 2 | client authenticates | `invalid_client` |
//! | 3 | client registered for the CIBA grant | `unauthorized_client` |
//! | 4 | exactly one of `login_hint`, `login_hint_token`, `id_token_hint` | `invalid_request` |
//! | 5 | hinted user exists | `unknown_user_id` |
//! | 6 | scope registered for the client | `invalid_scope` |
//! | 7 | ping/push: `client_notification_token` valid | `invalid_request` |
//! | 8 | `binding_message` valid, if sent | `invalid_binding_message` |
//! | 9 | `user_code` sent and correct, if required | `missing_user_code` / `invalid_user_code` |
//!
//! An accepted request becomes a pending [`CibaSession`] and the user's
//! device is alerted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CibaResult;
use crate::client_auth::{ClientAuthenticator, ClientCredentials};
use crate::config::SessionConfig;
use crate::error::CibaError;
use crate::notify::{DeviceNotification, DeviceNotifier};
use crate::session::CibaSession;
use crate::storage::{ClientApplicationStore, SessionStore, Stores, UserAccountStore};
use crate::types::{ClientApplication, DeliveryMode, UserAccount};

/// Validates the `client_notification_token` of ping and push clients.
pub type NotificationTokenValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Validates a `binding_message`.
pub type BindingMessageValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Compares the registered user code (first) with the presented one (second).
pub type UserCodeComparator = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Default notification token check: non-empty.
#[must_use]
pub fn default_notification_token_validator(token: &str) -> bool {
    !token.is_empty()
}

/// Default binding message check: non-empty and shorter than 10 characters.
#[must_use]
pub fn default_binding_message_validator(message: &str) -> bool {
    !message.is_empty() && message.chars().count() < 10
}

/// Default user code check: exact match.
#[must_use]
pub fn default_user_code_comparator(registered: &str, presented: &str) -> bool {
    registered == presented
}

/// Parameters of a backchannel authentication request.
///
/// Client credentials travel separately as [`ClientCredentials`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthenticationRequest {
    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Hint identifying the end-user.
    #[serde(default)]
    pub login_hint: Option<String>,

    /// Token identifying the end-user.
    #[serde(default)]
    pub login_hint_token: Option<String>,

    /// Previously issued ID token identifying the end-user.
    #[serde(default)]
    pub id_token_hint: Option<String>,

    /// Message displayed on both devices.
    #[serde(default)]
    pub binding_message: Option<String>,

    /// Bearer token for callbacks to the client.
    #[serde(default)]
    pub client_notification_token: Option<String>,

    /// Requested session lifetime in seconds.
    #[serde(default)]
    pub requested_expiry: Option<u64>,

    /// Secret code known to the end-user.
    #[serde(default)]
    pub user_code: Option<String>,
}

impl AuthenticationRequest {
    /// The single hint present, or `None` if zero or several were sent.
    fn single_hint(&self) -> Option<&str> {
        let mut hints = [&self.login_hint, &self.login_hint_token, &self.id_token_hint]
            .into_iter()
            .filter_map(|h| h.as_deref().filter(|h| !h.is_empty()));
        match (hints.next(), hints.next()) {
            (Some(hint), None) => Some(hint),
            _ => None,
        }
    }
}

/// Successful authentication response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    /// Identifier of the accepted request.
    pub auth_req_id: String,

    /// Session lifetime in seconds.
    pub expires_in: u64,

    /// Minimum seconds between token requests (poll clients only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Processes backchannel authentication requests.
#[derive(Clone)]
pub struct AuthenticationRequestProcessor {
    clients: Arc<dyn ClientApplicationStore>,
    users: Arc<dyn UserAccountStore>,
    sessions: Arc<dyn SessionStore>,
    device_notifier: Arc<dyn DeviceNotifier>,
    authenticator: ClientAuthenticator,
    default_expiry: Duration,
    max_expiry: Duration,
    poll_interval: Duration,
    notification_token_validator: NotificationTokenValidator,
    binding_message_validator: BindingMessageValidator,
    user_code_comparator: UserCodeComparator,
}

impl AuthenticationRequestProcessor {
    /// Creates a processor with the default validators.
    #[must_use]
    pub fn new(
        stores: &Stores,
        device_notifier: Arc<dyn DeviceNotifier>,
        authenticator: ClientAuthenticator,
        config: &SessionConfig,
    ) -> Self {
        Self {
            clients: stores.clients.clone(),
            users: stores.users.clone(),
            sessions: stores.sessions.clone(),
            device_notifier,
            authenticator,
            default_expiry: config.default_expiry,
            max_expiry: config.max_expiry,
            poll_interval: config.poll_interval,
            notification_token_validator: Arc::new(default_notification_token_validator),
            binding_message_validator: Arc::new(default_binding_message_validator),
            user_code_comparator: Arc::new(default_user_code_comparator),
        }
    }

    /// Replaces the `client_notification_token` check.
    #[must_use]
    pub fn with_notification_token_validator(mut self, validator: NotificationTokenValidator) -> Self {
        self.notification_token_validator = validator;
        self
    }

    /// Replaces the `binding_message` check.
    #[must_use]
    pub fn with_binding_message_validator(mut self, validator: BindingMessageValidator) -> Self {
        self.binding_message_validator = validator;
        self
    }

    /// Replaces the user code comparison.
    #[must_use]
    pub fn with_user_code_comparator(mut self, comparator: UserCodeComparator) -> Self {
        self.user_code_comparator = comparator;
        self
    }

    /// Validates the request, creates a session and alerts the user's device.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing validation, or a server error
    /// if the session cannot be stored or the device cannot be alerted.
    pub async fn process(
        &self,
        credentials: &ClientCredentials,
        request: &AuthenticationRequest,
    ) -> CibaResult<AuthenticationResponse> {
        let (client, user) = self.validate(credentials, request).await?;

        let expiry = match request.requested_expiry {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => self.default_expiry,
        };
        if expiry > self.max_expiry {
            tracing::debug!(
                client_id = %client.id,
                requested_expiry = expiry.as_secs(),
                "requested_expiry above maximum"
            );
            return Err(CibaError::invalid_request(format!(
                "requested_expiry must not exceed {} seconds",
                self.max_expiry.as_secs()
            )));
        }

        let mut session = CibaSession::new(
            &client.id,
            &user.id,
            request.scope.clone().unwrap_or_default(),
            expiry,
        )
        .with_binding_message(request.binding_message.clone())
        .with_notification_token(request.client_notification_token.clone());
        if client.token_mode == DeliveryMode::Poll {
            session = session.with_poll_interval(self.poll_interval);
        }

        if let Err(e) = self.sessions.create(&session).await {
            tracing::error!(client_id = %client.id, error = %e, "Failed to store CIBA session");
            return Err(e);
        }

        let alert = DeviceNotification {
            target: user.id.clone(),
            auth_req_id: session.auth_req_id.clone(),
        };
        if let Err(e) = self.device_notifier.notify_device(&alert).await {
            tracing::error!(
                client_id = %client.id,
                user_id = %user.id,
                error = %e,
                "Failed to alert authentication device, discarding session"
            );
            if let Err(delete_err) = self.sessions.delete(&session.auth_req_id).await {
                tracing::error!(error = %delete_err, "Failed to discard CIBA session");
            }
            return Err(CibaError::notification(e.to_string()));
        }

        tracing::info!(
            client_id = %client.id,
            user_id = %user.id,
            mode = %client.token_mode,
            expires_in = session.expires_in,
            "Accepted backchannel authentication request"
        );

        Ok(AuthenticationResponse {
            auth_req_id: session.auth_req_id,
            expires_in: session.expires_in,
            interval: session.interval,
        })
    }

    async fn validate(
        &self,
        credentials: &ClientCredentials,
        request: &AuthenticationRequest,
    ) -> CibaResult<(ClientApplication, UserAccount)> {
        // 1. Client exists
        let client_id = credentials.claimed_client_id().ok_or_else(|| {
            tracing::debug!("Authentication request without client identification");
            CibaError::unauthorized_client("Client not identified")
        })?;
        let client = self.clients.find_by_id(&client_id).await?.ok_or_else(|| {
            tracing::warn!(client_id = %client_id, "Authentication request from unknown client");
            CibaError::unauthorized_client("Unknown client")
        })?;

        // 2. Client authenticates
        if !self.authenticator.authenticate(credentials, &client) {
            tracing::warn!(client_id = %client.id, "Client authentication failed");
            return Err(CibaError::invalid_client("Client authentication failed"));
        }

        // 3. Registered for CIBA
        if !client.is_registered_for_ciba() {
            tracing::warn!(client_id = %client.id, "Client not registered for the CIBA grant");
            return Err(CibaError::unauthorized_client(
                "Client not registered for the CIBA grant",
            ));
        }

        // 4. Exactly one hint
        let hint = request.single_hint().ok_or_else(|| {
            tracing::debug!(client_id = %client.id, "Zero or several login hints");
            CibaError::invalid_request(
                "Exactly one of login_hint, login_hint_token or id_token_hint is required",
            )
        })?;

        // 5. Hinted user exists
        let user = self.users.find_by_hint(hint).await?.ok_or_else(|| {
            tracing::debug!(client_id = %client.id, "Login hint matches no user");
            CibaError::unknown_user_id("No user matches the hint")
        })?;

        // 6. Scope registered for the client
        let scope = request.scope.as_deref().unwrap_or_default();
        if !client.allows_scope(scope) {
            tracing::debug!(client_id = %client.id, scope = %scope, "Scope not registered for client");
            return Err(CibaError::invalid_scope("Requested scope exceeds client registration"));
        }

        // 7. Notification token for ping and push
        if client.token_mode.uses_notification_endpoint() {
            let token = request.client_notification_token.as_deref().unwrap_or_default();
            if !(self.notification_token_validator)(token) {
                tracing::debug!(client_id = %client.id, "Missing or malformed client_notification_token");
                return Err(CibaError::invalid_request(
                    "client_notification_token is missing or malformed",
                ));
            }
        }

        // 8. Binding message
        if let Some(message) = &request.binding_message
            && !(self.binding_message_validator)(message)
        {
            tracing::debug!(client_id = %client.id, "Binding message rejected");
            return Err(CibaError::invalid_binding_message("Binding message rejected"));
        }

        // 9. User code
        if client.user_code_parameter_supported {
            let presented = request
                .user_code
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or(CibaError::MissingUserCode)?;
            let registered = user.user_code.as_deref().unwrap_or_default();
            if !(self.user_code_comparator)(registered, presented) {
                tracing::debug!(client_id = %client.id, "User code mismatch");
                return Err(CibaError::InvalidUserCode);
            }
        }

        Ok((client, user))
    }
}

impl fmt::Debug for AuthenticationRequestProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRequestProcessor")
            .field("authenticator", &self.authenticator)
            .field("default_expiry", &self.default_expiry)
            .field("max_expiry", &self.max_expiry)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
