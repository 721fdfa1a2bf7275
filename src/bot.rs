use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::correlator::Correlator;
use crate::dispatcher::{InboundDispatcher, Outcome};
use crate::platform::telegram::incoming_from_message;
use crate::platform::{IncomingMessage, MessageSender, OutgoingMessage};

const RELAY_FAILED: &str = "⚠️ Не удалось отправить вопрос врачу. Попробуйте, пожалуйста, позже.";

/// Shared application state
pub struct AppState {
    sender: Arc<dyn MessageSender>,
    dispatcher: InboundDispatcher,
    correlator: Arc<Correlator>,
}

impl AppState {
    pub fn new(
        config: &Config,
        sender: Arc<dyn MessageSender>,
        correlator: Arc<Correlator>,
    ) -> Self {
        let dispatcher = InboundDispatcher::new(config, correlator.clone());
        Self {
            sender,
            dispatcher,
            correlator,
        }
    }

    /// Classify one message and carry out the result.
    ///
    /// Send failures are logged (and reported to whoever is waiting on them) but never
    /// returned: the caller only needs to acknowledge the update.
    pub async fn process(&self, incoming: &IncomingMessage) {
        info!(
            "Message from {} ({}): {}",
            incoming.sender_name, incoming.sender_id, incoming.text
        );

        match self.dispatcher.handle(incoming) {
            Outcome::Ignored(reason) => {
                debug!("Ignored message {}: {:?}", incoming.message_id, reason);
            }
            Outcome::Reply(reply) => {
                self.send_logged(&reply).await;
            }
            Outcome::Relay {
                relay,
                ack,
                question,
            } => match self.sender.send(&relay).await {
                Ok(relayed_id) => {
                    info!(
                        "Relayed question from {} ({}) to admin as message {}",
                        question.sender_label, question.sender_id, relayed_id
                    );
                    self.correlator.remember(relayed_id, question);
                    self.send_logged(&ack).await;
                }
                Err(e) => {
                    error!("Failed to relay question from {}: {}", question.sender_label, e);
                    self.send_logged(&OutgoingMessage::text(ack.chat_id, RELAY_FAILED))
                        .await;
                }
            },
            Outcome::Answer { delivery, route } => match self.sender.send(&delivery).await {
                Ok(_) => {
                    info!("Delivered answer to chat {} via {:?}", delivery.chat_id, route);
                    self.correlator.delivered(route);
                }
                Err(e) => {
                    error!("Failed to deliver answer to chat {}: {}", delivery.chat_id, e);
                    let notice = OutgoingMessage::text(
                        self.dispatcher.admin_chat(),
                        format!("⚠️ Не удалось доставить ответ пользователю: {e}"),
                    );
                    self.send_logged(&notice).await;
                }
            },
            Outcome::Report { notice, error } => {
                warn!("Could not route admin reply {}: {}", incoming.message_id, error);
                self.send_logged(&notice).await;
            }
        }
    }

    async fn send_logged(&self, message: &OutgoingMessage) {
        if let Err(e) = self.sender.send(message).await {
            error!("Failed to send message to chat {}: {}", message.chat_id, e);
        }
    }
}

/// Receive updates with long polling instead of a webhook
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = Update::filter_message()
        .filter_map(|msg: Message| incoming_from_message(&msg))
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("relay"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(incoming: IncomingMessage, state: Arc<AppState>) -> ResponseResult<()> {
    state.process(&incoming).await;
    Ok(())
}
