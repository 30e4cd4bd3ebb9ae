use std::time::Duration;

use async_trait::async_trait;
use octofhir_ciba::CibaResult;
use octofhir_ciba::config::NotificationConfig;
use octofhir_ciba::notify::{DeviceNotification, DeviceNotifier};
use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::error::NotificationError;

/// Alerts authentication devices through an FCM-style push gateway.
///
/// The gateway receives `{"to": <user>, "data": {"auth_req_id": ...}}`
/// authorized with `Authorization: key=<server key>`. Only `200` counts as
/// delivered.
pub struct DeviceGatewayNotifier {
    http_client: Client,
    gateway_url: String,
    server_key: String,
}

impl DeviceGatewayNotifier {
    /// Creates a notifier posting to `gateway_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        gateway_url: impl Into<String>,
        server_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            gateway_url: gateway_url.into(),
            server_key: server_key.into(),
        })
    }

    /// Creates a notifier from the `notifications` config section.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `device_server_key` is unset, or an error
    /// if the HTTP client cannot be built.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let server_key = config.device_server_key.as_deref().ok_or_else(|| {
            NotificationError::InvalidConfig("Missing notifications.device_server_key".into())
        })?;
        Self::new(&config.device_gateway_url, server_key, config.request_timeout)
    }

    async fn send(&self, notification: &DeviceNotification) -> Result<(), NotificationError> {
        let body = json!({
            "to": notification.target,
            "data": { "auth_req_id": notification.auth_req_id },
        });

        let response = self
            .http_client
            .post(&self.gateway_url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
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
impl DeviceNotifier for DeviceGatewayNotifier {
    async fn notify_device(&self, notification: &DeviceNotification) -> CibaResult<()> {
        self.send(notification).await.map_err(|e| {
            tracing::warn!(
                target_user = %notification.target,
                error = %e,
                "Device notification failed"
            );
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> DeviceNotification {
        DeviceNotification {
            target: "alice".to_string(),
            auth_req_id: "req-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_gateway_request_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fcm/send"))
            .and(header("authorization", "key=server-key"))
            .and(body_json(json!({
                "to": "alice",
                "data": { "auth_req_id": "req-1" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DeviceGatewayNotifier::new(
            format!("{}/fcm/send", server.uri()),
            "server-key",
            Duration::from_secs(5),
        )
        .unwrap();
        notifier.notify_device(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let notifier =
            DeviceGatewayNotifier::new(server.uri(), "wrong", Duration::from_secs(5)).unwrap();
        let err = notifier.notify_device(&alert()).await.unwrap_err();
        assert_eq!(err.error_code(), "server_error");
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let notifier =
            DeviceGatewayNotifier::new(server.uri(), "key", Duration::from_millis(50)).unwrap();
        assert!(notifier.notify_device(&alert()).await.is_err());
    }

    #[test]
    fn test_from_config_requires_server_key() {
        let config = NotificationConfig::default();
        assert!(matches!(
            DeviceGatewayNotifier::from_config(&config),
            Err(NotificationError::InvalidConfig(_))
        ));

        let config = NotificationConfig {
            device_server_key: Some("key".to_string()),
            ..NotificationConfig::default()
        };
        assert!(DeviceGatewayNotifier::from_config(&config).is_ok());
    }
}
