//! Wiring of the CIBA processors behind one handle.
//!
//! The embedding HTTP layer maps its three endpoints onto
//! [`CibaServer::authenticate`], [`CibaServer::consent`] and
//! [`CibaServer::token`], and protects resources with
//! [`CibaServer::resource_guard`].

use std::sync::Arc;

use crate::CibaResult;
use crate::authentication::{AuthenticationRequest, AuthenticationRequestProcessor, AuthenticationResponse};
use crate::client_auth::{ClientAuthenticator, ClientCredentials};
use crate::config::{CibaConfig, ConfigError};
use crate::consent::{ConsentProcessor, ConsentRequest};
use crate::grant::{TokenGrantProcessor, TokenRequest};
use crate::notify::{ClientNotifier, DeviceNotifier};
use crate::resource::ResourceGuard;
use crate::storage::Stores;
use crate::token::{TokenIssuer, TokenResponse, TokenSigner};

/// All CIBA processors sharing one set of stores and one configuration.
#[derive(Clone)]
pub struct CibaServer {
    config: Arc<CibaConfig>,
    authentication: AuthenticationRequestProcessor,
    consent: ConsentProcessor,
    grant: TokenGrantProcessor,
    resource_guard: ResourceGuard,
}

impl CibaServer {
    /// Validates the configuration and builds every processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: CibaConfig,
        stores: Stores,
        device_notifier: Arc<dyn DeviceNotifier>,
        client_notifier: Arc<dyn ClientNotifier>,
        signer: Arc<dyn TokenSigner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let authenticator = ClientAuthenticator::from_config(&config);
        let issuer = TokenIssuer::new(&stores, signer, &config);

        let authentication = AuthenticationRequestProcessor::new(
            &stores,
            device_notifier,
            authenticator.clone(),
            &config.session,
        );
        let consent = ConsentProcessor::new(&stores, client_notifier, issuer.clone());
        let grant = TokenGrantProcessor::new(&stores, authenticator, issuer, &config.session);
        let resource_guard = ResourceGuard::new(stores.access_tokens.clone());

        tracing::info!(
            issuer = %config.issuer,
            token_endpoint = %config.token_endpoint,
            "CIBA server initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            authentication,
            consent,
            grant,
            resource_guard,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &CibaConfig {
        &self.config
    }

    /// Backchannel authentication endpoint.
    ///
    /// # Errors
    ///
    /// See [`AuthenticationRequestProcessor::process`].
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
        request: &AuthenticationRequest,
    ) -> CibaResult<AuthenticationResponse> {
        self.authentication.process(credentials, request).await
    }

    /// Records the end-user's decision.
    ///
    /// # Errors
    ///
    /// See [`ConsentProcessor::process`].
    pub async fn consent(&self, request: &ConsentRequest) -> CibaResult<()> {
        self.consent.process(request).await
    }

    /// Token endpoint for the CIBA grant.
    ///
    /// # Errors
    ///
    /// See [`TokenGrantProcessor::process`].
    pub async fn token(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> CibaResult<TokenResponse> {
        self.grant.process(credentials, request).await
    }

    /// Guard for resources accepting the issued access tokens.
    #[must_use]
    pub fn resource_guard(&self) -> &ResourceGuard {
        &self.resource_guard
    }

    /// Processor behind [`Self::authenticate`], for custom validators.
    #[must_use]
    pub fn authentication_processor(&self) -> &AuthenticationRequestProcessor {
        &self.authentication
    }

    /// Replaces the authentication processor, e.g. with custom validators.
    #[must_use]
    pub fn with_authentication_processor(mut self, processor: AuthenticationRequestProcessor) -> Self {
        self.authentication = processor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InMemoryNotifier;
    use crate::storage::MemoryBackend;
    use crate::token::JwtSigner;

    #[test]
    fn test_rejects_invalid_config() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let config = CibaConfig {
            issuer: String::new(),
            ..CibaConfig::default()
        };

        let result = CibaServer::new(
            config,
            MemoryBackend::new().stores(),
            notifier.clone(),
            notifier,
            Arc::new(JwtSigner::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_builds_from_default_config() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let server = CibaServer::new(
            CibaConfig::default(),
            MemoryBackend::new().stores(),
            notifier.clone(),
            notifier,
            Arc::new(JwtSigner::new()),
        )
        .unwrap();
        assert_eq!(server.config().tokens.access_token_lifetime.as_secs(), 3600);
    }
}
