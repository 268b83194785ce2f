//! User aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Email, User};
pub use commands::{ChangePassword, RegisterUser, UpdateProfile};
pub use events::{UserCreatedData, UserEvent, UserPasswordChangedData, UserProfileUpdatedData};
pub use service::{PasswordHasher, UserService};

use thiserror::Error;

/// Maximum length of a display name.
pub const MAX_NAME_LEN: usize = 100;

/// Minimum length of a plain-text password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// The email address is malformed.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Another user already registered this email.
    #[error("Email already taken: {0}")]
    EmailTaken(String),

    /// The display name is empty or too long.
    #[error("Invalid name: must be 1 to {MAX_NAME_LEN} characters")]
    InvalidName,

    /// The password does not meet the policy.
    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    /// The password hash is empty.
    #[error("Password hash must not be empty")]
    MissingPasswordHash,
}

impl UserError {
    /// Stable code for client display.
    pub fn code(&self) -> &'static str {
        match self {
            UserError::InvalidEmail(_) => "invalid_email",
            UserError::EmailTaken(_) => "email_taken",
            UserError::InvalidName => "invalid_name",
            UserError::WeakPassword => "weak_password",
            UserError::MissingPasswordHash => "missing_password_hash",
        }
    }
}
