//! `client_secret_post` authentication.

use super::{ClientAuthStrategy, ClientCredentials, TokenEndpointAuthMethod, secrets_match};
use crate::types::ClientApplication;

/// Checks `client_id` and `client_secret` from the request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostStrategy;

impl ClientAuthStrategy for PostStrategy {
    fn method(&self) -> TokenEndpointAuthMethod {
        TokenEndpointAuthMethod::ClientSecretPost
    }

    fn authenticate(&self, credentials: &ClientCredentials, client: &ClientApplication) -> bool {
        match (&credentials.client_id, &credentials.client_secret) {
            (Some(id), Some(secret)) => *id == client.id && secrets_match(secret, &client.secret),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryMode;

    #[test]
    fn test_post_strategy() {
        let client = ClientApplication::new("app", "openid", DeliveryMode::Ping);
        let strategy = PostStrategy;

        assert!(strategy.authenticate(&ClientCredentials::post(&client.id, &client.secret), &client));
        assert!(!strategy.authenticate(&ClientCredentials::post(&client.id, "nope"), &client));

        let missing_secret = ClientCredentials {
            client_id: Some(client.id.clone()),
            ..ClientCredentials::default()
        };
        assert!(!strategy.authenticate(&missing_secret, &client));
    }
}
