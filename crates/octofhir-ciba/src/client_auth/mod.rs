//! Client authentication for the backchannel authentication and token
//! endpoints.
//!
//! Each registered client names the method it authenticates with. The
//! [`ClientAuthenticator`] keeps one [`ClientAuthStrategy`] per method and
//! dispatches on the client's registration.
//!
//! # Authentication Methods
//!
//! - `client_secret_basic` - HTTP Basic Auth with `client_id:client_secret`
//! - `client_secret_post` - `client_id` and `client_secret` in the request body
//! - `client_secret_jwt` - JWT assertion signed with the client secret
//!
//! Clients registered with any other method are checked with the basic
//! strategy unless [`ClientAuthenticator::fail_closed_on_unknown_method`] is set.
//!
//! Every strategy answers with a plain pass/fail. Malformed input is a
//! failure, never an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CibaConfig;
use crate::types::ClientApplication;

mod assertion;
mod basic;
mod post;

pub use assertion::{
    CLIENT_ASSERTION_TYPE_JWT_BEARER, ClientAssertionClaims, JwtAssertionStrategy, StringOrArray,
    extract_client_id_unverified,
};
pub use basic::{BasicStrategy, parse_basic_auth};
pub use post::PostStrategy;

// =============================================================================
// Auth Method
// =============================================================================

/// Token endpoint authentication methods.
///
/// Defined in OpenID Connect Core Section 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,

    /// JWT assertion signed with the client secret (HMAC).
    ClientSecretJwt,

    /// JWT assertion signed with a client private key.
    PrivateKeyJwt,

    /// No client authentication.
    None,

    /// Any method this server does not recognize.
    #[serde(other)]
    Unsupported,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::None => "none",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials presented by a client on an inbound request.
///
/// The transport layer fills in whatever it received; fields a method does
/// not use are ignored.
#[derive(Clone, Default, Deserialize)]
pub struct ClientCredentials {
    /// Raw `Authorization` header value.
    #[serde(skip)]
    pub authorization: Option<String>,

    /// `client_id` body parameter.
    #[serde(default)]
    pub client_id: Option<String>,

    /// `client_secret` body parameter.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// `client_assertion` body parameter.
    #[serde(default)]
    pub client_assertion: Option<String>,

    /// `client_assertion_type` body parameter.
    #[serde(default)]
    pub client_assertion_type: Option<String>,
}

impl ClientCredentials {
    /// Credentials carried in an `Authorization: Basic` header.
    #[must_use]
    pub fn basic(client_id: &str, client_secret: &str) -> Self {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
        Self {
            authorization: Some(format!("Basic {encoded}")),
            ..Self::default()
        }
    }

    /// Credentials carried in the request body.
    #[must_use]
    pub fn post(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// A JWT bearer client assertion.
    #[must_use]
    pub fn assertion(assertion: impl Into<String>) -> Self {
        Self {
            client_assertion: Some(assertion.into()),
            client_assertion_type: Some(CLIENT_ASSERTION_TYPE_JWT_BEARER.to_string()),
            ..Self::default()
        }
    }

    /// Sets the raw `Authorization` header.
    #[must_use]
    pub fn with_authorization(mut self, header: impl Into<String>) -> Self {
        self.authorization = Some(header.into());
        self
    }

    /// Returns the client the caller claims to be, without verifying it.
    ///
    /// Checked in order: the Basic header, the `client_id` parameter, and
    /// the `iss`/`sub` of an assertion.
    #[must_use]
    pub fn claimed_client_id(&self) -> Option<String> {
        if let Some((id, _)) = self.authorization.as_deref().and_then(parse_basic_auth) {
            return Some(id);
        }
        if let Some(id) = self.client_id.as_ref().filter(|id| !id.is_empty()) {
            return Some(id.clone());
        }
        self.client_assertion
            .as_deref()
            .and_then(extract_client_id_unverified)
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("authorization", &self.authorization.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("client_assertion", &self.client_assertion.as_ref().map(|_| "[REDACTED]"))
            .field("client_assertion_type", &self.client_assertion_type)
            .finish()
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// A way for a client to prove its identity.
pub trait ClientAuthStrategy: Send + Sync {
    /// The registration method this strategy checks.
    fn method(&self) -> TokenEndpointAuthMethod;

    /// Returns `true` if `credentials` prove the identity of `client`.
    fn authenticate(&self, credentials: &ClientCredentials, client: &ClientApplication) -> bool;
}

/// Constant-time comparison of a presented secret with the registered one.
pub(crate) fn secrets_match(presented: &str, registered: &str) -> bool {
    use subtle::ConstantTimeEq;

    if presented.len() != registered.len() {
        return false;
    }
    presented.as_bytes().ct_eq(registered.as_bytes()).into()
}

// =============================================================================
// Authenticator
// =============================================================================

/// Dispatches client authentication to the strategy registered for the
/// client's auth method.
#[derive(Clone)]
pub struct ClientAuthenticator {
    strategies: HashMap<TokenEndpointAuthMethod, Arc<dyn ClientAuthStrategy>>,
    fail_closed_on_unknown_method: bool,
}

impl ClientAuthenticator {
    /// Creates an authenticator with the basic, post and JWT assertion
    /// strategies. `token_endpoint` is the audience assertions must carry.
    #[must_use]
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            strategies: HashMap::new(),
            fail_closed_on_unknown_method: false,
        }
        .with_strategy(Arc::new(BasicStrategy))
        .with_strategy(Arc::new(PostStrategy))
        .with_strategy(Arc::new(JwtAssertionStrategy::new(token_endpoint)))
    }

    /// Creates an authenticator from the engine configuration.
    #[must_use]
    pub fn from_config(config: &CibaConfig) -> Self {
        Self::new(config.token_endpoint.clone())
            .fail_closed_on_unknown_method(config.client_auth.fail_closed_on_unknown_method)
    }

    /// Registers (or replaces) the strategy for its method.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn ClientAuthStrategy>) -> Self {
        self.strategies.insert(strategy.method(), strategy);
        self
    }

    /// Rejects clients whose method has no strategy instead of falling back
    /// to basic.
    #[must_use]
    pub fn fail_closed_on_unknown_method(mut self, fail_closed: bool) -> Self {
        self.fail_closed_on_unknown_method = fail_closed;
        self
    }

    /// Authenticates `client` with the presented credentials.
    pub fn authenticate(&self, credentials: &ClientCredentials, client: &ClientApplication) -> bool {
        let method = client.token_endpoint_auth_method;
        let strategy = match self.strategies.get(&method) {
            Some(strategy) => strategy,
            None if self.fail_closed_on_unknown_method => {
                tracing::warn!(
                    client_id = %client.id,
                    method = %method,
                    "Client auth method not supported, rejecting"
                );
                return false;
            }
            None => {
                tracing::debug!(
                    client_id = %client.id,
                    method = %method,
                    "Client auth method not supported, falling back to client_secret_basic"
                );
                match self.strategies.get(&TokenEndpointAuthMethod::ClientSecretBasic) {
                    Some(strategy) => strategy,
                    None => return false,
                }
            }
        };

        let authenticated = strategy.authenticate(credentials, client);
        if !authenticated {
            tracing::debug!(client_id = %client.id, method = %strategy.method(), "Client authentication failed");
        }
        authenticated
    }
}

impl fmt::Debug for ClientAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuthenticator")
            .field("methods", &self.strategies.keys().collect::<Vec<_>>())
            .field("fail_closed_on_unknown_method", &self.fail_closed_on_unknown_method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryMode;

    const TOKEN_ENDPOINT: &str = "https://auth.example.com/token";

    fn client(method: TokenEndpointAuthMethod) -> ClientApplication {
        ClientApplication::new("test", "openid", DeliveryMode::Poll).with_auth_method(method)
    }

    #[test]
    fn test_dispatches_on_registered_method() {
        let auth = ClientAuthenticator::new(TOKEN_ENDPOINT);
        let post_client = client(TokenEndpointAuthMethod::ClientSecretPost);

        let post = ClientCredentials::post(&post_client.id, &post_client.secret);
        let basic = ClientCredentials::basic(&post_client.id, &post_client.secret);

        assert!(auth.authenticate(&post, &post_client));
        assert!(!auth.authenticate(&basic, &post_client));
    }

    #[test]
    fn test_unknown_method_falls_back_to_basic() {
        let auth = ClientAuthenticator::new(TOKEN_ENDPOINT);
        let c = client(TokenEndpointAuthMethod::PrivateKeyJwt);

        assert!(auth.authenticate(&ClientCredentials::basic(&c.id, &c.secret), &c));
        assert!(!auth.authenticate(&ClientCredentials::post(&c.id, &c.secret), &c));
    }

    #[test]
    fn test_unknown_method_fail_closed() {
        let auth = ClientAuthenticator::new(TOKEN_ENDPOINT).fail_closed_on_unknown_method(true);
        let c = client(TokenEndpointAuthMethod::Unsupported);

        assert!(!auth.authenticate(&ClientCredentials::basic(&c.id, &c.secret), &c));
    }

    #[test]
    fn test_unknown_method_deserializes_as_unsupported() {
        let method: TokenEndpointAuthMethod =
            serde_json::from_str("\"tls_client_auth\"").unwrap();
        assert_eq!(method, TokenEndpointAuthMethod::Unsupported);

        let method: TokenEndpointAuthMethod =
            serde_json::from_str("\"client_secret_jwt\"").unwrap();
        assert_eq!(method, TokenEndpointAuthMethod::ClientSecretJwt);
    }

    #[test]
    fn test_custom_strategy_replaces_default() {
        struct AlwaysDeny;
        impl ClientAuthStrategy for AlwaysDeny {
            fn method(&self) -> TokenEndpointAuthMethod {
                TokenEndpointAuthMethod::ClientSecretBasic
            }
            fn authenticate(&self, _: &ClientCredentials, _: &ClientApplication) -> bool {
                false
            }
        }

        let auth = ClientAuthenticator::new(TOKEN_ENDPOINT).with_strategy(Arc::new(AlwaysDeny));
        let c = client(TokenEndpointAuthMethod::ClientSecretBasic);
        assert!(!auth.authenticate(&ClientCredentials::basic(&c.id, &c.secret), &c));
    }

    #[test]
    fn test_claimed_client_id_order() {
        let creds = ClientCredentials::post("body-client", "s").with_authorization(
            ClientCredentials::basic("header-client", "s")
                .authorization
                .unwrap(),
        );
        assert_eq!(creds.claimed_client_id().as_deref(), Some("header-client"));

        let creds = ClientCredentials::post("body-client", "s");
        assert_eq!(creds.claimed_client_id().as_deref(), Some("body-client"));

        assert_eq!(ClientCredentials::default().claimed_client_id(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ClientCredentials::post("client", "super-secret");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("client"));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
        assert!(!secrets_match("", "abc"));
    }
}
