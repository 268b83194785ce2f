//! User aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, EventBuffer};

use super::{
    MAX_NAME_LEN, UserError, UserEvent,
    events::{UserCreatedData, UserPasswordChangedData, UserProfileUpdatedData},
};

/// A validated, normalized email address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Parses and lowercases an email address.
    pub fn parse(raw: &str) -> Result<Self, UserError> {
        let email = raw.trim().to_lowercase();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.contains(char::is_whitespace)
            }
            None => false,
        };

        if valid {
            Ok(Self(email))
        } else {
            Err(UserError::InvalidEmail(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_name(name: &str) -> Result<String, UserError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(UserError::InvalidName);
    }
    Ok(name.to_string())
}

/// User aggregate root.
#[derive(Debug, Clone, Default)]
pub struct User {
    id: AggregateId,
    version: i64,
    email: Email,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: EventBuffer<UserEvent>,
}

impl Aggregate for User {
    type Event = UserEvent;
    type Error = UserError;

    fn aggregate_type() -> &'static str {
        "User"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn validate(&self) -> Result<(), UserError> {
        Email::parse(self.email.as_str())?;
        validate_name(&self.name)?;
        if self.password_hash.is_empty() {
            return Err(UserError::MissingPasswordHash);
        }
        Ok(())
    }

    fn apply(&mut self, event: &UserEvent) {
        match event {
            UserEvent::UserCreated(data) => {
                self.id = data.user_id;
                self.email = Email(data.email.clone());
                self.name = data.name.clone();
                self.created_at = data.created_at;
                self.updated_at = data.created_at;
            }
            UserEvent::UserProfileUpdated(data) => {
                self.name = data.name.clone();
                self.updated_at = data.updated_at;
            }
            UserEvent::UserPasswordChanged(data) => {
                self.updated_at = data.changed_at;
            }
        }
    }

    fn events(&self) -> &[UserEvent] {
        self.events.events()
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}

// Query methods
impl User {
    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// Command methods (stage events)
impl User {
    /// Registers a new user, staging `UserCreated`.
    pub fn register(
        id: AggregateId,
        email: &str,
        name: &str,
        password_hash: String,
    ) -> Result<Self, UserError> {
        let email = Email::parse(email)?;
        let name = validate_name(name)?;
        if password_hash.is_empty() {
            return Err(UserError::MissingPasswordHash);
        }

        let mut user = User {
            password_hash,
            ..Default::default()
        };
        let event = UserEvent::UserCreated(UserCreatedData {
            user_id: id,
            email: email.0,
            name,
            created_at: Utc::now(),
        });
        user.apply(&event);
        user.events.record(event);
        Ok(user)
    }

    /// Changes the display name, staging `UserProfileUpdated`.
    pub fn update_profile(&mut self, name: &str) -> Result<(), UserError> {
        let name = validate_name(name)?;

        let event = UserEvent::UserProfileUpdated(UserProfileUpdatedData {
            user_id: self.id,
            name,
            updated_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(())
    }

    /// Replaces the password hash, staging `UserPasswordChanged`.
    pub fn change_password(&mut self, password_hash: String) -> Result<(), UserError> {
        if password_hash.is_empty() {
            return Err(UserError::MissingPasswordHash);
        }

        self.password_hash = password_hash;
        let event = UserEvent::UserPasswordChanged(UserPasswordChangedData {
            user_id: self.id,
            changed_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(())
    }

    /// Rebuilds a user from its persisted row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: AggregateId,
        version: i64,
        email: String,
        name: String,
        password_hash: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            email: Email(email),
            name,
            password_hash,
            created_at,
            updated_at,
            events: EventBuffer::new(),
        }
    }
}
