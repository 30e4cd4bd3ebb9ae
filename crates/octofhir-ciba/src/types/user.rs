//! End-user accounts.

use serde::{Deserialize, Serialize};

/// An end-user that can be the subject of a backchannel authentication.
///
/// The `id` is what clients send as `login_hint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// User identifier, used as hint and as `sub`.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Code the user shares with the client to prevent unsolicited requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
}

impl UserAccount {
    /// Creates an account with the given identifier.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            user_code: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the user code.
    #[must_use]
    pub fn with_user_code(mut self, code: impl Into<String>) -> Self {
        self.user_code = Some(code.into());
        self
    }
}
