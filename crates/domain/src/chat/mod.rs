//! Direct messages between users.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::Message;
pub use commands::{CreateMessage, MarkMessageRead};
pub use events::{MessageCreatedData, MessageEvent, MessageReadData};
pub use service::ChatService;

use thiserror::Error;

/// Maximum message length in characters.
pub const MAX_CONTENT_LEN: usize = 4096;

/// Errors that can occur during chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Message content exceeds {MAX_CONTENT_LEN} characters")]
    ContentTooLong,

    /// Sender and receiver are the same user.
    #[error("Cannot send a message to yourself")]
    SelfMessage,

    /// Only the receiver may mark a message as read.
    #[error("Only the recipient can mark a message as read")]
    NotRecipient,
}

impl ChatError {
    /// Stable code for client display.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::EmptyContent => "empty_content",
            ChatError::ContentTooLong => "content_too_long",
            ChatError::SelfMessage => "self_message",
            ChatError::NotRecipient => "not_recipient",
        }
    }
}
