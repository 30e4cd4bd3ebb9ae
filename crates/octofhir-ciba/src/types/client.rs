//! Registered client applications.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::client_auth::TokenEndpointAuthMethod;
use crate::scope;

/// Grant type identifier of the CIBA grant.
pub const CIBA_GRANT_TYPE: &str = "urn:openid:params:grant-type:ciba";

// =============================================================================
// Delivery Mode
// =============================================================================

/// How a client learns the outcome of a backchannel authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// The client polls the token endpoint.
    Poll,
    /// The server pings the client, which then calls the token endpoint once.
    Ping,
    /// The server pushes the tokens to the client's notification endpoint.
    Push,
}

impl DeliveryMode {
    /// Returns the registration value of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Ping => "ping",
            Self::Push => "push",
        }
    }

    /// Returns `true` if the server calls back the client in this mode.
    #[must_use]
    pub fn uses_notification_endpoint(&self) -> bool {
        matches!(self, Self::Ping | Self::Push)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(Self::Poll),
            "ping" => Ok(Self::Ping),
            "push" => Ok(Self::Push),
            other => Err(format!("unknown token delivery mode: {other}")),
        }
    }
}

// =============================================================================
// Client Application
// =============================================================================

/// A client registered to use backchannel authentication.
///
/// Registrations are created out of band and are read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientApplication {
    /// Client identifier.
    pub id: String,

    /// Shared secret, also the HMAC key of `client_secret_jwt` assertions.
    pub secret: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Registered scopes (space-separated).
    pub scope: String,

    /// Token delivery mode.
    pub token_mode: DeliveryMode,

    /// Callback endpoint for `ping` and `push` clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_notification_endpoint: Option<String>,

    /// Algorithm of signed authentication requests, if the client sends them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_request_signing_alg: Option<String>,

    /// Whether the client must send a `user_code`.
    #[serde(default)]
    pub user_code_parameter_supported: bool,

    /// How the client authenticates at the endpoints.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Registered grant type identifiers.
    #[serde(default)]
    pub grant_types: Vec<String>,
}

fn default_auth_method() -> TokenEndpointAuthMethod {
    TokenEndpointAuthMethod::ClientSecretBasic
}

impl ClientApplication {
    /// Creates a CIBA client with a fresh identifier and secret.
    #[must_use]
    pub fn new(name: impl Into<String>, scope: impl Into<String>, token_mode: DeliveryMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            secret: generate_secret(),
            name: name.into(),
            scope: scope.into(),
            token_mode,
            client_notification_endpoint: None,
            authentication_request_signing_alg: None,
            user_code_parameter_supported: false,
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            grant_types: vec![CIBA_GRANT_TYPE.to_string()],
        }
    }

    /// Sets the callback endpoint.
    #[must_use]
    pub fn with_notification_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client_notification_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the client authentication method.
    #[must_use]
    pub fn with_auth_method(mut self, method: TokenEndpointAuthMethod) -> Self {
        self.token_endpoint_auth_method = method;
        self
    }

    /// Requires a `user_code` on authentication requests.
    #[must_use]
    pub fn with_user_code_required(mut self, required: bool) -> Self {
        self.user_code_parameter_supported = required;
        self
    }

    /// Returns `true` if the client registered the given grant type.
    #[must_use]
    pub fn is_registered_for_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Returns `true` if the client registered the CIBA grant.
    #[must_use]
    pub fn is_registered_for_ciba(&self) -> bool {
        self.is_registered_for_grant(CIBA_GRANT_TYPE)
    }

    /// Returns `true` if every requested scope is registered for the client.
    #[must_use]
    pub fn allows_scope(&self, requested: &str) -> bool {
        scope::is_subset(requested, &self.scope)
    }
}

/// Generates a 512-bit random client secret, base64url-encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_is_registered_for_ciba() {
        let client = ClientApplication::new("bank app", "openid email", DeliveryMode::Poll);
        assert!(client.is_registered_for_ciba());
        assert!(!client.is_registered_for_grant("authorization_code"));
        assert!(!client.id.is_empty());
        assert_eq!(client.secret.len(), 86);
    }

    #[test]
    fn test_allows_scope() {
        let client = ClientApplication::new("app", "openid email profile", DeliveryMode::Ping);
        assert!(client.allows_scope("openid email"));
        assert!(!client.allows_scope("openid address"));
    }

    #[test]
    fn test_delivery_mode_parsing() {
        assert_eq!("push".parse::<DeliveryMode>().unwrap(), DeliveryMode::Push);
        assert!("smoke-signal".parse::<DeliveryMode>().is_err());
        assert!(DeliveryMode::Ping.uses_notification_endpoint());
        assert!(!DeliveryMode::Poll.uses_notification_endpoint());
    }

    #[test]
    fn test_client_deserialization_defaults() {
        let json = r#"{
            "id": "client-1",
            "secret": "s3cr3t",
            "scope": "openid",
            "token_mode": "poll"
        }"#;
        let client: ClientApplication = serde_json::from_str(json).unwrap();
        assert_eq!(
            client.token_endpoint_auth_method,
            TokenEndpointAuthMethod::ClientSecretBasic
        );
        assert!(client.grant_types.is_empty());
        assert!(!client.user_code_parameter_supported);
    }
}
