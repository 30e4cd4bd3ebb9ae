use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use octofhir_ciba::CibaResult;
use octofhir_ciba::config::NotificationConfig;
use octofhir_ciba::notify::{ClientNotification, ClientNotifier};
use reqwest::{Client, StatusCode};
use sha2::Sha256;

use crate::error::NotificationError;

type HmacSha256 = Hmac<Sha256>;

/// Delivers ping and push callbacks to client notification endpoints.
///
/// Each callback is a JSON `POST` authorized with the
/// `client_notification_token` the client sent in its authentication
/// request. `200` and `204` count as delivered.
pub struct ClientCallbackNotifier {
    http_client: Client,
    signing_secret: Option<String>,
}

impl ClientCallbackNotifier {
    /// Creates an unsigned notifier whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, NotificationError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            signing_secret: None,
        })
    }

    /// Creates a notifier from the `notifications` config section, signing
    /// callbacks when `callback_signing_secret` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let notifier = Self::new(config.request_timeout)?;
        Ok(match &config.callback_signing_secret {
            Some(secret) => notifier.with_signing_secret(secret),
            None => notifier,
        })
    }

    /// Signs every callback body with HMAC-SHA256 (`X-Signature-256`).
    #[must_use]
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    fn sign_payload(&self, payload: &str, secret: &str) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn send(&self, notification: &ClientNotification) -> Result<(), NotificationError> {
        let payload_str = serde_json::to_string(&notification.payload.body())
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let mut request = self
            .http_client
            .post(&notification.endpoint)
            .bearer_auth(&notification.client_notification_token)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.signing_secret {
            let signature = self.sign_payload(&payload_str, secret)?;
            request = request.header("X-Signature-256", format!("sha256={signature}"));
        }

        let response = request.body(payload_str).send().await?;

        let status = response.status();
        if matches!(status, StatusCode::OK | StatusCode::NO_CONTENT) {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ClientNotifier for ClientCallbackNotifier {
    async fn notify_client(&self, notification: &ClientNotification) -> CibaResult<()> {
        match self.send(notification).await {
            Ok(()) => {
                tracing::debug!(
                    mode = %notification.token_method,
                    endpoint = %notification.endpoint,
                    success = notification.success(),
                    "Client callback delivered"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    mode = %notification.token_method,
                    endpoint = %notification.endpoint,
                    error = %e,
                    "Client callback failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_ciba::DeliveryMode;
    use octofhir_ciba::notify::CallbackPayload;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ping(endpoint: String) -> ClientNotification {
        ClientNotification {
            token_method: DeliveryMode::Ping,
            endpoint,
            client_notification_token: "cb-token".to_string(),
            payload: CallbackPayload::Ping {
                auth_req_id: "req-1".to_string(),
            },
        }
    }

    #[test]
    fn test_callback_signature() {
        let notifier = ClientCallbackNotifier::new(Duration::from_secs(5)).unwrap();
        let signature = notifier.sign_payload(r#"{"test": "data"}"#, "secret123").unwrap();
        assert_eq!(signature.len(), 64);
        // Signature should be consistent
        let signature2 = notifier.sign_payload(r#"{"test": "data"}"#, "secret123").unwrap();
        assert_eq!(signature, signature2);
    }

    #[test]
    fn test_from_config_applies_signing_secret() {
        let config = NotificationConfig::default();
        let notifier = ClientCallbackNotifier::from_config(&config).unwrap();
        assert!(notifier.signing_secret.is_none());

        let config = NotificationConfig {
            callback_signing_secret: Some("cb-secret".to_string()),
            ..NotificationConfig::default()
        };
        let notifier = ClientCallbackNotifier::from_config(&config).unwrap();
        assert_eq!(notifier.signing_secret.as_deref(), Some("cb-secret"));
    }

    #[tokio::test]
    async fn test_ping_callback_sent_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cb"))
            .and(header("authorization", "Bearer cb-token"))
            .and(body_json(json!({ "auth_req_id": "req-1" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = ClientCallbackNotifier::new(Duration::from_secs(5)).unwrap();
        notifier
            .notify_client(&ping(format!("{}/cb", server.uri())))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signed_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("x-signature-256"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = ClientCallbackNotifier::new(Duration::from_secs(5))
            .unwrap()
            .with_signing_secret("cb-secret");
        notifier
            .notify_client(&ping(format!("{}/cb", server.uri())))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let notifier = ClientCallbackNotifier::new(Duration::from_secs(5)).unwrap();
        let err = notifier
            .notify_client(&ping(format!("{}/cb", server.uri())))
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert!(err.to_string().contains("202"));
    }
}
