//! Chat commands.

use common::AggregateId;

/// Command to send a message.
#[derive(Debug, Clone)]
pub struct CreateMessage {
    pub sender_id: AggregateId,
    pub receiver_id: AggregateId,
    pub content: String,
}

impl CreateMessage {
    pub fn new(sender_id: AggregateId, receiver_id: AggregateId, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            content: content.into(),
        }
    }
}

/// Command to mark a message as read.
#[derive(Debug, Clone)]
pub struct MarkMessageRead {
    pub message_id: AggregateId,
    pub reader_id: AggregateId,
}

impl MarkMessageRead {
    pub fn new(message_id: AggregateId, reader_id: AggregateId) -> Self {
        Self {
            message_id,
            reader_id,
        }
    }
}
