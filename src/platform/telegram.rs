use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup};

use crate::error::PlatformError;
use crate::platform::{IncomingMessage, MessageId, MessageSender, OutgoingMessage, RepliedMessage};

/// Telegram rejects texts over 4096 characters; stay a little under.
const MAX_CHUNK_CHARS: usize = 4000;

/// Cut `text` into pieces of at most `max_chars` characters, breaking after the last newline
/// (or space) that fits. The first piece always starts with the start of `text`, so a relay
/// header stays in the message whose id gets tracked.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while let Some((limit, _)) = rest.char_indices().nth(max_chars) {
        let window = &rest[..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map_or(limit, |pos| pos + 1);
        let (chunk, tail) = rest.split_at(cut);
        chunks.push(chunk.to_string());
        rest = tail;
    }
    chunks.push(rest.to_string());

    chunks
}

/// Convert a Telegram message into the platform-neutral form.
///
/// Returns `None` for messages without a sender or without text (stickers, photos,
/// service messages), which the relay does not handle.
pub fn incoming_from_message(msg: &Message) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?.to_string();

    let reply_to = msg.reply_to_message().map(|replied| RepliedMessage {
        message_id: replied.id.0,
        text: replied.text().map(str::to_string),
        forwarded_from: replied.forward_from_user().map(|u| u.id.0),
    });

    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        sender_id: user.id.0,
        sender_username: user.username.clone(),
        sender_name: user.full_name(),
        text,
        reply_to,
    })
}

fn reply_keyboard(buttons: &[String]) -> KeyboardMarkup {
    let row: Vec<KeyboardButton> = buttons.iter().map(KeyboardButton::new).collect();
    KeyboardMarkup::new(vec![row]).resize_keyboard()
}

/// `MessageSender` backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, message: &OutgoingMessage) -> Result<MessageId, PlatformError> {
        let chat_id = ChatId(message.chat_id);
        let mut first_id = None;

        for chunk in split_message(&message.text, MAX_CHUNK_CHARS) {
            let mut request = self.bot.send_message(chat_id, chunk);
            // The keyboard only needs to ride on the first chunk
            if first_id.is_none() {
                if let Some(buttons) = &message.keyboard {
                    request = request.reply_markup(reply_keyboard(buttons));
                }
            }
            let sent = request.await?;
            first_id.get_or_insert(sent.id.0);
        }

        first_id.ok_or_else(|| PlatformError::message("nothing was sent"))
    }
}
