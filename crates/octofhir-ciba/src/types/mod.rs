//! Domain types shared by the CIBA processors and the stores.

pub mod access_token;
pub mod client;
pub mod key;
pub mod user;

pub use access_token::{AccessToken, TOKEN_TYPE_BEARER, generate_token_value};
pub use client::{CIBA_GRANT_TYPE, ClientApplication, DeliveryMode, generate_secret};
pub use key::SigningKey;
pub use user::UserAccount;
