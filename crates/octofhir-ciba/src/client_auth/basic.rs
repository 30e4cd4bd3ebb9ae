//! `client_secret_basic` authentication.

use super::{ClientAuthStrategy, ClientCredentials, TokenEndpointAuthMethod, secrets_match};
use crate::types::ClientApplication;

/// Checks `client_id:client_secret` from an HTTP Basic `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategy;

impl ClientAuthStrategy for BasicStrategy {
    fn method(&self) -> TokenEndpointAuthMethod {
        TokenEndpointAuthMethod::ClientSecretBasic
    }

    fn authenticate(&self, credentials: &ClientCredentials, client: &ClientApplication) -> bool {
        let Some((id, secret)) = credentials.authorization.as_deref().and_then(parse_basic_auth)
        else {
            return false;
        };
        id == client.id && secrets_match(&secret, &client.secret)
    }
}

/// Parses an HTTP Basic Auth header value.
///
/// Returns `(client_id, client_secret)` or `None` if the header is not a
/// well-formed Basic credential.
///
/// # Example
///
/// ```
/// use octofhir_ciba::client_auth::parse_basic_auth;
///
/// let (id, secret) = parse_basic_auth("Basic Y2xpZW50OnNlY3JldA==").unwrap();
/// assert_eq!(id, "client");
/// assert_eq!(secret, "secret");
/// ```
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Password may contain colons
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((client_id.to_string(), client_secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryMode;

    #[test]
    fn test_parse_basic_auth() {
        // "client:pa:ss" in base64
        let parsed = parse_basic_auth("Basic Y2xpZW50OnBhOnNz");
        assert_eq!(parsed, Some(("client".to_string(), "pa:ss".to_string())));
    }

    #[test]
    fn test_parse_basic_auth_rejects_malformed() {
        assert!(parse_basic_auth("Bearer abc").is_none());
        assert!(parse_basic_auth("Basic !!!not-base64").is_none());
        // "nocolon"
        assert!(parse_basic_auth("Basic bm9jb2xvbg==").is_none());
    }

    #[test]
    fn test_basic_strategy() {
        let client = ClientApplication::new("app", "openid", DeliveryMode::Poll);
        let strategy = BasicStrategy;

        assert!(strategy.authenticate(&ClientCredentials::basic(&client.id, &client.secret), &client));
        assert!(!strategy.authenticate(&ClientCredentials::basic(&client.id, "wrong"), &client));
        assert!(!strategy.authenticate(&ClientCredentials::basic("other", &client.secret), &client));
        assert!(!strategy.authenticate(&ClientCredentials::default(), &client));
    }
}
