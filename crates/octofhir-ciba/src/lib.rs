//! # octofhir-ciba
//!
//! OpenID Connect Client-Initiated Backchannel Authentication (CIBA) engine
//! for the OctoFHIR server.
//!
//! This crate provides:
//! - Authentication request admission with ordered validation
//! - The `auth_req_id` session state machine
//! - Consent handling with push, ping and poll side effects
//! - The CIBA token grant, including poll throttling and a bounded consent wait
//! - Client authentication (`client_secret_basic`, `client_secret_post`,
//!   `client_secret_jwt`)
//! - ID token construction with `at_hash`
//!
//! ## Overview
//!
//! A client asks the server to authenticate an end-user out of band. The
//! server notifies the user's authentication device, tracks the request
//! until the user decides, and hands out tokens through the client's
//! delivery mode (`poll`, `ping` or `push`).
//!
//! HTTP routing is left to the embedding server. Persistence and outbound
//! delivery sit behind the traits in [`storage`] and [`notify`].
//!
//! ## Modules
//!
//! - [`authentication`] - Backchannel authentication request processing
//! - [`client_auth`] - Client authentication strategies
//! - [`config`] - Engine configuration
//! - [`consent`] - Consent decision processing
//! - [`grant`] - CIBA token grant processing
//! - [`notify`] - Outbound notifier traits and payloads
//! - [`resource`] - Bearer token checks for resource servers
//! - [`server`] - Wiring of all processors
//! - [`session`] - Session model and lifecycle
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`token`] - ID token claims, `at_hash` and signing

pub mod authentication;
pub mod client_auth;
pub mod config;
pub mod consent;
pub mod error;
pub mod grant;
pub mod notify;
pub mod observability;
pub mod resource;
pub mod scope;
pub mod server;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use authentication::{AuthenticationRequest, AuthenticationRequestProcessor, AuthenticationResponse};
pub use client_auth::{ClientAuthenticator, ClientCredentials, TokenEndpointAuthMethod};
pub use config::{CibaConfig, ConfigError};
pub use consent::{ConsentProcessor, ConsentRequest};
pub use error::{CibaError, ErrorCategory, ErrorResponse};
pub use grant::{TokenGrantProcessor, TokenRequest};
pub use notify::{ClientNotifier, DeviceNotifier};
pub use resource::ResourceGuard;
pub use server::CibaServer;
pub use session::{CibaSession, Consent, SessionState};
pub use storage::Stores;
pub use token::{AtHashMode, JwtError, TokenResponse};
pub use types::{AccessToken, ClientApplication, DeliveryMode, SigningKey, UserAccount};

/// Type alias for CIBA results.
pub type CibaResult<T> = Result<T, CibaError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_ciba::prelude::*;
/// ```
pub mod prelude {
    pub use crate::CibaResult;
    pub use crate::authentication::{AuthenticationRequest, AuthenticationResponse};
    pub use crate::client_auth::{ClientCredentials, TokenEndpointAuthMethod};
    pub use crate::config::CibaConfig;
    pub use crate::consent::ConsentRequest;
    pub use crate::error::{CibaError, ErrorCategory, ErrorResponse};
    pub use crate::grant::TokenRequest;
    pub use crate::notify::{ClientNotifier, DeviceNotifier};
    pub use crate::server::CibaServer;
    pub use crate::session::{CibaSession, Consent};
    pub use crate::storage::{MemoryBackend, Stores};
    pub use crate::token::TokenResponse;
    pub use crate::types::{ClientApplication, DeliveryMode, SigningKey, UserAccount};
}
