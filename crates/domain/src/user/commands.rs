//! User commands.

use common::AggregateId;

/// Command to register a new user.
#[derive(Clone)]
pub struct RegisterUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl RegisterUser {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: name.into(),
        }
    }
}

// Keeps the password out of logs and spans.
impl std::fmt::Debug for RegisterUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterUser")
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Command to change a user's display name.
#[derive(Debug, Clone)]
pub struct UpdateProfile {
    pub user_id: AggregateId,
    pub name: String,
}

impl UpdateProfile {
    pub fn new(user_id: AggregateId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }
}

/// Command to change a user's password.
#[derive(Clone)]
pub struct ChangePassword {
    pub user_id: AggregateId,
    pub new_password: String,
}

impl ChangePassword {
    pub fn new(user_id: AggregateId, new_password: impl Into<String>) -> Self {
        Self {
            user_id,
            new_password: new_password.into(),
        }
    }
}

impl std::fmt::Debug for ChangePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePassword")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
