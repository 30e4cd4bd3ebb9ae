//! HTTP transports for the CIBA engine's outbound notifications.
//!
//! - [`ClientCallbackNotifier`] calls client notification endpoints in
//!   `ping` and `push` mode
//! - [`DeviceGatewayNotifier`] alerts the end-user's authentication device
//!   through a push gateway

pub mod client;
pub mod device;
pub mod error;

pub use client::ClientCallbackNotifier;
pub use device::DeviceGatewayNotifier;
pub use error::NotificationError;
