//! CIBA error types.
//!
//! Every failure the engine reports to a caller maps onto one of the
//! OpenID Connect / OAuth 2.0 error identifiers used by the backchannel
//! authentication and token endpoints, together with the HTTP status the
//! transport layer should answer with.
//!
//! The `Display` output of an error carries internal detail for logs. What a
//! caller sees is produced by [`CibaError::to_response`], which only exposes
//! the standard identifier and its canonical description.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors produced by the CIBA engine.
#[derive(Debug, thiserror::Error)]
pub enum CibaError {
    /// The end-user has not yet been authenticated.
    #[error("Authorization pending")]
    AuthorizationPending,

    /// The client is polling faster than its interval allows.
    #[error("Slow down")]
    SlowDown,

    /// The `auth_req_id` has expired or was already used.
    #[error("Expired token: {message}")]
    ExpiredToken {
        /// Description of why the request is no longer usable.
        message: String,
    },

    /// The end-user denied the authorization request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of the denial.
        message: String,
    },

    /// The client is not allowed to use this flow or delivery mode.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is not authorized.
        message: String,
    },

    /// The request is missing or repeats a parameter, or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The `auth_req_id` is unknown or was issued to another client.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The server could not complete the transaction.
    #[error("Transaction failed: {message}")]
    TransactionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The requested scope is not covered by the client's registration.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The `login_hint_token` has expired.
    #[error("Expired login hint token: {message}")]
    ExpiredLoginHintToken {
        /// Description of the expired hint.
        message: String,
    },

    /// The hint does not resolve to a known end-user.
    #[error("Unknown user id: {message}")]
    UnknownUserId {
        /// Description of the unresolved hint.
        message: String,
    },

    /// The client requires a user code but none was supplied.
    #[error("Missing user code")]
    MissingUserCode,

    /// The supplied user code does not match the end-user's code.
    #[error("Invalid user code")]
    InvalidUserCode,

    /// The binding message was rejected by the validator.
    #[error("Invalid binding message: {message}")]
    InvalidBindingMessage {
        /// Description of why the message was rejected.
        message: String,
    },

    /// Client authentication failed.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The `grant_type` is not the CIBA grant.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The rejected grant type.
        grant_type: String,
    },

    /// The bearer token presented to a resource is missing, unknown or expired.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The bearer token does not carry the scope a resource requires.
    #[error("Insufficient scope: {message}")]
    InsufficientScope {
        /// Description of the missing scope.
        message: String,
    },

    /// A store operation failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// An outbound notification could not be delivered.
    #[error("Notification error: {message}")]
    Notification {
        /// Description of the delivery failure.
        message: String,
    },

    /// A token could not be signed or verified.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing error.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl CibaError {
    /// Creates a new `ExpiredToken` error.
    #[must_use]
    pub fn expired_token(message: impl Into<String>) -> Self {
        Self::ExpiredToken {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionFailed` error.
    #[must_use]
    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `ExpiredLoginHintToken` error.
    #[must_use]
    pub fn expired_login_hint_token(message: impl Into<String>) -> Self {
        Self::ExpiredLoginHintToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownUserId` error.
    #[must_use]
    pub fn unknown_user_id(message: impl Into<String>) -> Self {
        Self::UnknownUserId {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidBindingMessage` error.
    #[must_use]
    pub fn invalid_binding_message(message: impl Into<String>) -> Self {
        Self::InvalidBindingMessage {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientScope` error.
    #[must_use]
    pub fn insufficient_scope(message: impl Into<String>) -> Self {
        Self::InsufficientScope {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Notification` error.
    #[must_use]
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::Notification { .. }
                | Self::Signing { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` for the steady-state answers a polling client expects
    /// while the end-user has not decided yet.
    #[must_use]
    pub fn is_pending_state(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthorizationPending
            | Self::SlowDown
            | Self::ExpiredToken { .. }
            | Self::AccessDenied { .. } => ErrorCategory::ProtocolState,
            Self::InvalidClient { .. }
            | Self::UnauthorizedClient { .. }
            | Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::InvalidToken { .. } | Self::InsufficientScope { .. } => ErrorCategory::Token,
            Self::InvalidRequest { .. }
            | Self::InvalidScope { .. }
            | Self::ExpiredLoginHintToken { .. }
            | Self::UnknownUserId { .. }
            | Self::MissingUserCode
            | Self::InvalidUserCode
            | Self::InvalidBindingMessage { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::TransactionFailed { .. } => ErrorCategory::Validation,
            Self::Storage { .. } | Self::Notification { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Signing { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OpenID Connect error identifier for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken { .. } => "expired_token",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::ExpiredLoginHintToken { .. } => "expired_login_hint_token",
            Self::UnknownUserId { .. } => "unknown_user_id",
            Self::MissingUserCode => "missing_user_code",
            Self::InvalidUserCode => "invalid_user_code",
            Self::InvalidBindingMessage { .. } => "invalid_binding_message",
            Self::InvalidClient { .. } => "invalid_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidToken { .. } => "invalid_token",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::Storage { .. }
            | Self::Notification { .. }
            | Self::Signing { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the HTTP status code the transport should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ExpiredToken { .. } | Self::InvalidClient { .. } | Self::InvalidToken { .. } => {
                401
            }
            Self::AccessDenied { .. } | Self::InsufficientScope { .. } => 403,
            _ if self.is_server_error() => 500,
            _ => 400,
        }
    }

    /// Returns the canonical, caller-facing description for this error.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthorizationPending => {
                "The authorization request is still pending as the end-user hasn't yet been authenticated."
            }
            Self::SlowDown => "The token request is too fast.",
            Self::ExpiredToken { .. } => "The auth_req_id has expired.",
            Self::AccessDenied { .. } => "The end-user denied the authorization request.",
            Self::UnauthorizedClient { .. } => {
                "The Client is not authorized to use this authentication flow."
            }
            Self::InvalidRequest { .. } => {
                "The request is missing a required parameter, includes an invalid parameter value, includes a parameter more than once, contains more than one of the hints, or is otherwise malformed."
            }
            Self::InvalidGrant { .. } => {
                "The auth_req_id is invalid or was issued to another client."
            }
            Self::TransactionFailed { .. } => {
                "The OpenID Provider encountered an unexpected condition that prevented it from successfully completing the transaction."
            }
            Self::InvalidScope { .. } => "The requested scope is invalid, unknown, or malformed.",
            Self::ExpiredLoginHintToken { .. } => {
                "The login_hint_token provided in the authentication request is not valid because it has expired."
            }
            Self::UnknownUserId { .. } => {
                "The OpenID Provider is not able to identify which end-user the Client wishes to be authenticated by means of the hint provided in the request."
            }
            Self::MissingUserCode => "User code is required but was missing from the request.",
            Self::InvalidUserCode => "User code was invalid.",
            Self::InvalidBindingMessage { .. } => {
                "The binding message is invalid or unacceptable for use in the context of the given request."
            }
            Self::InvalidClient { .. } => "Client authentication failed.",
            Self::UnsupportedGrantType { .. } => {
                "The authorization grant type is not supported by the authorization server."
            }
            Self::InvalidToken { .. } => {
                "The access token provided is expired, revoked, malformed, or invalid."
            }
            Self::InsufficientScope { .. } => {
                "The request requires higher privileges than provided by the access token."
            }
            Self::Storage { .. }
            | Self::Notification { .. }
            | Self::Signing { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => "An internal server error occurred.",
        }
    }

    /// Builds the caller-facing error object.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.description().to_string(),
            error_uri: None,
            status_code: self.status_code(),
        }
    }
}

/// Error object returned to callers of the CIBA endpoints and carried in
/// failed push callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error identifier, e.g. `slow_down`.
    pub error: String,

    /// Human-readable description.
    pub error_description: String,

    /// Optional URI with more information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,

    /// HTTP status code.
    pub status_code: u16,
}

impl From<&CibaError> for ErrorResponse {
    fn from(err: &CibaError) -> Self {
        err.to_response()
    }
}

/// Categories of CIBA errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Expected protocol answers (pending, slow down, expired, denied).
    ProtocolState,
    /// Client identity or grant ownership failures.
    Authentication,
    /// Request validation errors.
    Validation,
    /// Resource-server token errors.
    Token,
    /// Store or transport failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolState => write!(f, "protocol_state"),
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::Token => write!(f, "token"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
