//! CIBA engine configuration.
//!
//! Configuration is grouped into subsections for session handling, token
//! minting, client authentication, outbound notifications and logging.
//! Every subsection has sensible defaults so a partial file is enough.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://auth.example.com"
//! token_endpoint = "https://auth.example.com/token"
//!
//! [session]
//! default_expiry = "2m"
//! max_expiry = "10m"
//! poll_interval = "5s"
//! consent_wait_timeout = "30s"
//!
//! [tokens]
//! access_token_lifetime = "1h"
//! at_hash = "canonical"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::token::AtHashMode;

/// Root configuration of the CIBA engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CibaConfig {
    /// Issuer URL placed in the `iss` claim of ID tokens.
    pub issuer: String,

    /// Absolute URL of the token endpoint.
    /// JWT client assertions must carry this value as their audience.
    pub token_endpoint: String,

    /// Authentication request (session) settings.
    pub session: SessionConfig,

    /// Token minting settings.
    pub tokens: TokenConfig,

    /// Client authentication settings.
    pub client_auth: ClientAuthConfig,

    /// Outbound notification transport settings.
    pub notifications: NotificationConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for CibaConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            token_endpoint: "http://localhost:8080/token".to_string(),
            session: SessionConfig::default(),
            tokens: TokenConfig::default(),
            client_auth: ClientAuthConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Session (auth_req_id) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Expiry applied when the client sends no `requested_expiry`.
    #[serde(with = "humantime_serde")]
    pub default_expiry: Duration,

    /// Longest `requested_expiry` a client may ask for.
    #[serde(with = "humantime_serde")]
    pub max_expiry: Duration,

    /// Minimum time between two token requests of a `poll` client.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long a poll-mode token request waits for the end-user's decision.
    #[serde(with = "humantime_serde")]
    pub consent_wait_timeout: Duration,

    /// How often the session is re-read while waiting.
    #[serde(with = "humantime_serde")]
    pub consent_poll_step: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_expiry: Duration::from_secs(120),
            max_expiry: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
            consent_wait_timeout: Duration::from_secs(30),
            consent_poll_step: Duration::from_secs(1),
        }
    }
}

/// Token minting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access token lifetime, reported as `expires_in`.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// ID token lifetime (`exp - iat`).
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// How the `at_hash` claim is truncated.
    pub at_hash: AtHashMode,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600),
            id_token_lifetime: Duration::from_secs(3600),
            at_hash: AtHashMode::Canonical,
        }
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientAuthConfig {
    /// Reject clients registered with an auth method that has no strategy,
    /// instead of checking them with HTTP Basic credentials.
    pub fail_closed_on_unknown_method: bool,
}

/// Outbound notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Push gateway used to alert the end-user's authentication device.
    pub device_gateway_url: String,

    /// Server key sent to the push gateway.
    pub device_server_key: Option<String>,

    /// Secret used to sign client callbacks (`X-Signature-256`).
    pub callback_signing_secret: Option<String>,

    /// HTTP timeout for outbound notifications.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            device_gateway_url: "https://fcm.googleapis.com/fcm/send".to_string(),
            device_server_key: None,
            callback_signing_secret: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<ConfigError> for crate::CibaError {
    fn from(err: ConfigError) -> Self {
        crate::CibaError::configuration(err.to_string())
    }
}

impl CibaConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }

        if self.token_endpoint.is_empty() {
            return Err(ConfigError::Missing("token_endpoint".to_string()));
        }

        let endpoint = url::Url::parse(&self.token_endpoint).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "token_endpoint '{}' is not an absolute URL: {}",
                self.token_endpoint, e
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "token_endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        let durations = [
            ("session.default_expiry", self.session.default_expiry),
            ("session.max_expiry", self.session.max_expiry),
            ("session.poll_interval", self.session.poll_interval),
            (
                "session.consent_wait_timeout",
                self.session.consent_wait_timeout,
            ),
            ("session.consent_poll_step", self.session.consent_poll_step),
            (
                "tokens.access_token_lifetime",
                self.tokens.access_token_lifetime,
            ),
            ("tokens.id_token_lifetime", self.tokens.id_token_lifetime),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{} must be > 0", name)));
            }
        }

        if self.session.default_expiry > self.session.max_expiry {
            return Err(ConfigError::InvalidValue(
                "session.default_expiry must not exceed session.max_expiry".to_string(),
            ));
        }

        if self.session.consent_poll_step > self.session.consent_wait_timeout {
            return Err(ConfigError::InvalidValue(
                "session.consent_poll_step must not exceed session.consent_wait_timeout"
                    .to_string(),
            ));
        }

        if self.notifications.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "notifications.request_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

pub mod loader {
    //! Layered configuration loading: an optional TOML file overlaid with
    //! `CIBA__`-prefixed environment variables.

    use super::{CibaConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "ciba.toml";

    /// Loads and validates the configuration.
    ///
    /// Environment variables override file values, e.g.
    /// `CIBA__SESSION__POLL_INTERVAL=10s`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load_config(path: Option<&str>) -> Result<CibaConfig, ConfigError> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        } else if path.is_some() {
            tracing::warn!(path = %file.display(), "Config file not found, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix("CIBA")
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?;
        let merged: CibaConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;

        merged.validate()?;
        Ok(merged)
    }
}
