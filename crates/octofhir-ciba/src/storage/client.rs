//! Client application and user account lookups.

use async_trait::async_trait;

use crate::CibaResult;
use crate::types::{ClientApplication, UserAccount};

/// Read access to registered client applications.
///
/// Registrations are managed out of band; the engine only reads them.
#[async_trait]
pub trait ClientApplicationStore: Send + Sync {
    /// Finds a client by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, client_id: &str) -> CibaResult<Option<ClientApplication>>;
}

/// Read access to end-user accounts.
#[async_trait]
pub trait UserAccountStore: Send + Sync {
    /// Resolves a login hint to an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hint(&self, hint: &str) -> CibaResult<Option<UserAccount>>;
}
