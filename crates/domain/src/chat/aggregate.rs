//! Message aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::aggregate::{Aggregate, EventBuffer};

use super::{
    ChatError, MAX_CONTENT_LEN, MessageEvent,
    events::{MessageCreatedData, MessageReadData},
};

/// A direct message from one user to another.
#[derive(Debug, Clone, Default)]
pub struct Message {
    id: AggregateId,
    version: i64,
    sender_id: AggregateId,
    receiver_id: AggregateId,
    content: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
    events: EventBuffer<MessageEvent>,
}

fn validate_content(content: &str) -> Result<String, ChatError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ChatError::ContentTooLong);
    }
    Ok(content.to_string())
}

impl Aggregate for Message {
    type Event = MessageEvent;
    type Error = ChatError;

    fn aggregate_type() -> &'static str {
        "Message"
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

    fn validate(&self) -> Result<(), ChatError> {
        validate_content(&self.content)?;
        if self.sender_id == self.receiver_id {
            return Err(ChatError::SelfMessage);
        }
        Ok(())
    }

    fn apply(&mut self, event: &MessageEvent) {
        match event {
            MessageEvent::MessageCreated(data) => {
                self.id = data.message_id;
                self.sender_id = data.sender_id;
                self.receiver_id = data.receiver_id;
                self.content = data.content.clone();
                self.created_at = data.created_at;
            }
            MessageEvent::MessageRead(data) => {
                self.read_at = Some(data.read_at);
            }
        }
    }

    fn events(&self) -> &[MessageEvent] {
        self.events.events()
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl Message {
    pub fn sender_id(&self) -> AggregateId {
        self.sender_id
    }

    pub fn receiver_id(&self) -> AggregateId {
        self.receiver_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn read_at(&self) -> Option<DateTime<Utc>> {
        self.read_at
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Sends a message, staging `MessageCreated`.
    pub fn create(
        id: AggregateId,
        sender_id: AggregateId,
        receiver_id: AggregateId,
        content: &str,
    ) -> Result<Self, ChatError> {
        if sender_id == receiver_id {
            return Err(ChatError::SelfMessage);
        }
        let content = validate_content(content)?;

        let mut message = Message::default();
        let event = MessageEvent::MessageCreated(MessageCreatedData {
            message_id: id,
            sender_id,
            receiver_id,
            content,
            created_at: Utc::now(),
        });
        message.apply(&event);
        message.events.record(event);
        Ok(message)
    }

    /// Marks the message read by its receiver.
    ///
    /// Returns false and stages nothing when it was already read.
    pub fn mark_read(&mut self, reader_id: AggregateId) -> Result<bool, ChatError> {
        if reader_id != self.receiver_id {
            return Err(ChatError::NotRecipient);
        }
        if self.is_read() {
            return Ok(false);
        }

        let event = MessageEvent::MessageRead(MessageReadData {
            message_id: self.id,
            reader_id,
            read_at: Utc::now(),
        });
        self.apply(&event);
        self.events.record(event);
        Ok(true)
    }

    /// Rebuilds a message from its persisted row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: AggregateId,
        version: i64,
        sender_id: AggregateId,
        receiver_id: AggregateId,
        content: String,
        created_at: DateTime<Utc>,
        read_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            version,
            sender_id,
            receiver_id,
            content,
            created_at,
            read_at,
            events: EventBuffer::new(),
        }
    }
}
