//! Outbound notifications.
//!
//! The engine talks to two parties outside the request/response cycle:
//!
//! - the end-user's authentication device, alerted when a request is
//!   accepted ([`DeviceNotifier`])
//! - the client's notification endpoint, called back in `ping` and `push`
//!   mode once the user decided ([`ClientNotifier`])
//!
//! HTTP transports live in the `octofhir-notifications` crate. The
//! [`InMemoryNotifier`] here records what would have been sent.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::CibaResult;
use crate::error::{CibaError, ErrorResponse};
use crate::token::TokenResponse;
use crate::types::DeliveryMode;

// ============================================================================
// Payloads
// ============================================================================

/// Body of a client callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
    /// Tokens delivered in push mode.
    PushSuccess {
        /// Request the tokens belong to.
        auth_req_id: String,
        /// The issued tokens.
        tokens: TokenResponse,
    },

    /// Failure delivered in push mode.
    PushError {
        /// Request that failed.
        auth_req_id: String,
        /// Error object.
        error: ErrorResponse,
    },

    /// Ping mode wake-up. The client fetches tokens itself.
    Ping {
        /// Request that is ready.
        auth_req_id: String,
    },
}

impl CallbackPayload {
    /// Returns `false` only for push errors.
    #[must_use]
    pub fn success(&self) -> bool {
        !matches!(self, Self::PushError { .. })
    }

    /// Request the callback is about.
    #[must_use]
    pub fn auth_req_id(&self) -> &str {
        match self {
            Self::PushSuccess { auth_req_id, .. }
            | Self::PushError { auth_req_id, .. }
            | Self::Ping { auth_req_id } => auth_req_id,
        }
    }

    /// JSON body sent to the client.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::PushSuccess {
                auth_req_id,
                tokens,
            } => json!({
                "auth_req_id": auth_req_id,
                "access_token": tokens.access_token,
                "token_type": tokens.token_type,
                "expires_in": tokens.expires_in,
                "id_token": tokens.id_token,
            }),
            Self::PushError { auth_req_id, error } => {
                let mut body = json!({
                    "auth_req_id": auth_req_id,
                    "error": error.error,
                    "error_description": error.error_description,
                });
                if let Some(uri) = &error.error_uri {
                    body["error_uri"] = json!(uri);
                }
                body
            }
            Self::Ping { auth_req_id } => json!({ "auth_req_id": auth_req_id }),
        }
    }
}

/// A callback to a client's notification endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientNotification {
    /// Delivery mode of the client.
    pub token_method: DeliveryMode,

    /// Callback URL.
    pub endpoint: String,

    /// Bearer token the client gave with the authentication request.
    pub client_notification_token: String,

    /// What is being delivered.
    pub payload: CallbackPayload,
}

impl ClientNotification {
    /// Returns `false` for failed push deliveries.
    #[must_use]
    pub fn success(&self) -> bool {
        self.payload.success()
    }
}

/// An alert to the end-user's authentication device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotification {
    /// The user (login hint) to alert.
    pub target: String,

    /// Request awaiting the user's decision.
    pub auth_req_id: String,
}

// ============================================================================
// Traits
// ============================================================================

/// Delivers callbacks to client notification endpoints.
#[async_trait]
pub trait ClientNotifier: Send + Sync {
    /// Sends one callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint could not be reached or rejected
    /// the callback.
    async fn notify_client(&self, notification: &ClientNotification) -> CibaResult<()>;
}

/// Alerts end-user authentication devices.
#[async_trait]
pub trait DeviceNotifier: Send + Sync {
    /// Sends one alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert could not be delivered.
    async fn notify_device(&self, notification: &DeviceNotification) -> CibaResult<()>;
}

// ============================================================================
// In-memory notifier
// ============================================================================

/// Notifier that records deliveries instead of sending them.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    client: Mutex<Vec<ClientNotification>>,
    device: Mutex<Vec<DeviceNotification>>,
    failing: AtomicBool,
}

impl InMemoryNotifier {
    /// Creates a notifier that accepts every delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Client callbacks recorded so far.
    #[must_use]
    pub fn client_notifications(&self) -> Vec<ClientNotification> {
        self.client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Device alerts recorded so far.
    #[must_use]
    pub fn device_notifications(&self) -> Vec<DeviceNotification> {
        self.device
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn check_failing(&self) -> CibaResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CibaError::notification("delivery disabled"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClientNotifier for InMemoryNotifier {
    async fn notify_client(&self, notification: &ClientNotification) -> CibaResult<()> {
        self.check_failing()?;
        self.client
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl DeviceNotifier for InMemoryNotifier {
    async fn notify_device(&self, notification: &DeviceNotification) -> CibaResult<()> {
        self.check_failing()?;
        self.device
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}
