pub mod telegram;

use async_trait::async_trait;

use crate::error::PlatformError;

/// Identifier of a message inside one chat.
pub type MessageId = i32;

/// A text message received from the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message arrived in (equals the sender id for private chats)
    pub chat_id: i64,
    pub message_id: MessageId,
    pub sender_id: u64,
    pub sender_username: Option<String>,
    /// Display name of the user
    pub sender_name: String,
    pub text: String,
    /// The message this one replies to, if any
    pub reply_to: Option<RepliedMessage>,
}

/// The parts of a replied-to message needed for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliedMessage {
    pub message_id: MessageId,
    pub text: Option<String>,
    /// Original author from forward metadata, when the platform exposes it.
    pub forwarded_from: Option<u64>,
}

/// A message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    /// One-row reply keyboard shown under the input field
    pub keyboard: Option<Vec<String>>,
}

impl OutgoingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, buttons: Vec<String>) -> Self {
        self.keyboard = Some(buttons);
        self
    }
}

/// Outbound side of the messaging platform.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a message and return the id of the (first) message created.
    async fn send(&self, message: &OutgoingMessage) -> Result<MessageId, PlatformError>;
}
