use std::sync::Arc;
use std::time::Instant;

use teloxide::utils::command::BotCommands;
use tracing::debug;

use crate::config::{Config, CorrelationStrategy, MessagesConfig};
use crate::correlator::{marker, Correlator, PendingQuestion, Resolution, Route};
use crate::error::CorrelationError;
use crate::platform::{IncomingMessage, OutgoingMessage};

/// Commands understood by the bot.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Команды:")]
pub enum Command {
    #[command(description = "начать")]
    Start,
    #[command(description = "помощь")]
    Help,
}

/// Why a message produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyText,
    UnknownCommand,
    /// An administrator message that is not an answer to anything
    Unaddressed,
}

/// What should happen in response to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    /// Answer the sender directly (welcome, prompt, help).
    Reply(OutgoingMessage),
    /// Pass a user's question to the administrator and thank the user.
    Relay {
        relay: OutgoingMessage,
        ack: OutgoingMessage,
        question: PendingQuestion,
    },
    /// Deliver an administrator answer to a user.
    Answer {
        delivery: OutgoingMessage,
        route: Route,
    },
    /// Tell the administrator their reply could not be routed.
    Report {
        notice: OutgoingMessage,
        error: CorrelationError,
    },
}

/// Classifies incoming messages. Holds no I/O handles; `handle` never blocks on the network.
pub struct InboundDispatcher {
    admin_id: u64,
    bot_username: String,
    messages: MessagesConfig,
    correlator: Arc<Correlator>,
}

impl InboundDispatcher {
    pub fn new(config: &Config, correlator: Arc<Correlator>) -> Self {
        Self {
            admin_id: config.telegram.admin_id,
            bot_username: config.telegram.bot_username.clone().unwrap_or_default(),
            messages: config.messages.clone(),
            correlator,
        }
    }

    pub fn admin_chat(&self) -> i64 {
        self.admin_id as i64
    }

    pub fn handle(&self, msg: &IncomingMessage) -> Outcome {
        self.handle_at(msg, Instant::now())
    }

    pub fn handle_at(&self, msg: &IncomingMessage, now: Instant) -> Outcome {
        if msg.text.trim().is_empty() {
            return Outcome::Ignored(IgnoreReason::EmptyText);
        }

        if msg.sender_id == self.admin_id {
            self.handle_admin(msg, now)
        } else {
            self.handle_user(msg, now)
        }
    }

    fn handle_user(&self, msg: &IncomingMessage, now: Instant) -> Outcome {
        if msg.text.starts_with('/') {
            return match Command::parse(&msg.text, &self.bot_username) {
                Ok(Command::Start) | Ok(Command::Help) => Outcome::Reply(
                    OutgoingMessage::text(msg.chat_id, self.messages.welcome.clone())
                        .with_keyboard(vec![self.messages.trigger.clone()]),
                ),
                Err(_) => {
                    debug!("Ignoring unknown command from {}: {}", msg.sender_id, msg.text);
                    Outcome::Ignored(IgnoreReason::UnknownCommand)
                }
            };
        }

        if msg.text == self.messages.trigger {
            return Outcome::Reply(OutgoingMessage::text(
                msg.chat_id,
                self.messages.prompt.clone(),
            ));
        }

        let sender_label = match msg.sender_username.as_deref() {
            Some(name) => format!("@{name}"),
            None => msg.sender_name.clone(),
        };

        Outcome::Relay {
            relay: OutgoingMessage::text(
                self.admin_chat(),
                marker::relay_text(msg.sender_id, msg.sender_username.as_deref(), &msg.text),
            ),
            ack: OutgoingMessage::text(msg.chat_id, self.messages.thanks.clone()),
            question: PendingQuestion {
                sender_id: msg.sender_id,
                chat_id: msg.chat_id,
                sender_label,
                relayed_at: now,
            },
        }
    }

    fn handle_admin(&self, msg: &IncomingMessage, now: Instant) -> Outcome {
        if msg.text.starts_with('/') {
            if Command::parse(&msg.text, &self.bot_username).is_ok() {
                return Outcome::Reply(OutgoingMessage::text(msg.chat_id, self.admin_help()));
            }
            return Outcome::Ignored(IgnoreReason::UnknownCommand);
        }

        match self
            .correlator
            .resolve(&msg.text, msg.reply_to.as_ref(), now)
        {
            Resolution::Routed(routing) => Outcome::Answer {
                delivery: OutgoingMessage::text(
                    routing.chat_id,
                    format!("{}\n\n{}", self.messages.answer_header, routing.body),
                ),
                route: routing.route,
            },
            Resolution::Failed(error) => Outcome::Report {
                notice: OutgoingMessage::text(
                    msg.chat_id,
                    format!("⚠️ Ответ не доставлен: {error}.\n\n{}", self.answer_hint()),
                ),
                error,
            },
            Resolution::Unaddressed => Outcome::Ignored(IgnoreReason::Unaddressed),
        }
    }

    fn answer_hint(&self) -> String {
        let reply = "Чтобы ответить, используйте «Ответить» (reply) на сообщении с вопросом.";
        if self.correlator.accepts_marker() {
            format!(
                "{reply}\nИли отправьте сообщение в формате:\n{}",
                marker::embed(12345, "<текст ответа>")
            )
        } else {
            reply.to_string()
        }
    }

    fn admin_help(&self) -> String {
        let routing = match self.correlator.strategy() {
            CorrelationStrategy::Disabled => {
                "Ответы пациентам через бота отключены.".to_string()
            }
            _ => self.answer_hint(),
        };
        format!(
            "Вопросы пациентов приходят сюда.\n{routing}\n\n{}",
            Command::descriptions()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorrelationConfig;
    use crate::platform::RepliedMessage;

    const ADMIN: u64 = 42;

    fn config(strategy: CorrelationStrategy) -> Config {
        let mut config = Config::from_sources(None, |name| match name {
            "BOT_TOKEN" => Some("123:abc".to_string()),
            "ADMIN_ID" => Some(ADMIN.to_string()),
            _ => None,
        })
        .unwrap();
        config.telegram.bot_username = Some("doctor_relay_bot".to_string());
        config.correlation = CorrelationConfig {
            strategy,
            ..CorrelationConfig::default()
        };
        config
    }

    fn dispatcher(strategy: CorrelationStrategy) -> InboundDispatcher {
        let config = config(strategy);
        let correlator = Arc::new(Correlator::new(&config.correlation));
        InboundDispatcher::new(&config, correlator)
    }

    fn from_user(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: 12345,
            message_id: 1,
            sender_id: 12345,
            sender_username: Some("alice".to_string()),
            sender_name: "Alice".to_string(),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn from_admin(text: &str, reply_to: Option<RepliedMessage>) -> IncomingMessage {
        IncomingMessage {
            chat_id: ADMIN as i64,
            message_id: 2,
            sender_id: ADMIN,
            sender_username: Some("doc".to_string()),
            sender_name: "Doc".to_string(),
            text: text.to_string(),
            reply_to,
        }
    }

    #[test]
    fn test_user_question_is_relayed_once() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        match d.handle(&from_user("What is this rash?")) {
            Outcome::Relay {
                relay,
                ack,
                question,
            } => {
                assert_eq!(relay.chat_id, ADMIN as i64);
                assert_eq!(
                    relay.text,
                    "📩 Вопрос от @alice (ID: 12345):\n\nWhat is this rash?"
                );
                assert_eq!(ack.chat_id, 12345);
                assert_eq!(ack.text, "✅ Спасибо за вопрос! Врач обязательно посмотрит его 👨‍⚕️");
                assert_eq!(question.sender_id, 12345);
                assert_eq!(question.sender_label, "@alice");
            }
            other => panic!("expected relay, got {other:?}"),
        }
    }

    #[test]
    fn test_user_without_username_uses_id() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        let mut msg = from_user("Hello");
        msg.sender_username = None;
        match d.handle(&msg) {
            Outcome::Relay {
                relay, question, ..
            } => {
                assert_eq!(relay.text, "📩 Вопрос от @12345 (ID: 12345):\n\nHello");
                assert_eq!(question.sender_label, "Alice");
            }
            other => panic!("expected relay, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_phrase_only_prompts() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        assert_eq!(
            d.handle(&from_user("✍️ Задать вопрос")),
            Outcome::Reply(OutgoingMessage::text(
                12345,
                "Пожалуйста, напишите свой вопрос 👇"
            ))
        );
    }

    #[test]
    fn test_start_shows_keyboard() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        for text in ["/start", "/start@doctor_relay_bot"] {
            match d.handle(&from_user(text)) {
                Outcome::Reply(reply) => {
                    assert_eq!(reply.chat_id, 12345);
                    assert!(reply.text.starts_with("👋 Добро пожаловать!"));
                    assert_eq!(reply.keyboard, Some(vec!["✍️ Задать вопрос".to_string()]));
                }
                other => panic!("expected welcome, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_command_and_blank_text_ignored() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        assert_eq!(
            d.handle(&from_user("/weather")),
            Outcome::Ignored(IgnoreReason::UnknownCommand)
        );
        assert_eq!(
            d.handle(&from_user("   ")),
            Outcome::Ignored(IgnoreReason::EmptyText)
        );
    }

    #[test]
    fn test_admin_marker_answer() {
        let d = dispatcher(CorrelationStrategy::TextEmbedding);
        assert_eq!(
            d.handle(&from_admin("ID: 12345\n\nApply cream twice daily", None)),
            Outcome::Answer {
                delivery: OutgoingMessage::text(
                    12345,
                    "👨‍⚕️ Ответ врача:\n\nApply cream twice daily"
                ),
                route: Route::Marker,
            }
        );
    }

    #[test]
    fn test_admin_malformed_marker_reported_to_admin_only() {
        let d = dispatcher(CorrelationStrategy::TextEmbedding);
        match d.handle(&from_admin("Apply cream twice daily", None)) {
            Outcome::Report { notice, error } => {
                assert_eq!(notice.chat_id, ADMIN as i64);
                assert_eq!(error, CorrelationError::MissingMarker);
                assert!(notice.text.contains("ID: 12345"));
            }
            other => panic!("expected report, got {other:?}"),
        }
    }

    #[test]
    fn test_admin_reply_to_tracked_relay() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        let now = Instant::now();
        let Outcome::Relay { question, .. } = d.handle_at(&from_user("What is this rash?"), now)
        else {
            panic!("expected relay");
        };
        d.correlator.remember(1001, question);

        let reply = RepliedMessage {
            message_id: 1001,
            text: None,
            forwarded_from: None,
        };
        assert_eq!(
            d.handle_at(&from_admin("Apply cream", Some(reply)), now),
            Outcome::Answer {
                delivery: OutgoingMessage::text(12345, "👨‍⚕️ Ответ врача:\n\nApply cream"),
                route: Route::SideTable { key: 1001 },
            }
        );
    }

    #[test]
    fn test_admin_typed_marker_routes_in_side_table_mode() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        assert_eq!(
            d.handle(&from_admin("ID: 12345\n\nApply cream twice daily", None)),
            Outcome::Answer {
                delivery: OutgoingMessage::text(
                    12345,
                    "👨‍⚕️ Ответ врача:\n\nApply cream twice daily"
                ),
                route: Route::Marker,
            }
        );
    }

    #[test]
    fn test_admin_plain_message_reported_in_side_table_mode() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        match d.handle(&from_admin("note to self", None)) {
            Outcome::Report { notice, error } => {
                assert_eq!(notice.chat_id, ADMIN as i64);
                assert_eq!(error, CorrelationError::MissingMarker);
                assert!(notice.text.contains("ID: 12345"));
            }
            other => panic!("expected report, got {other:?}"),
        }
    }

    #[test]
    fn test_admin_trigger_phrase_is_not_relayed() {
        let d = dispatcher(CorrelationStrategy::TextEmbedding);
        assert!(matches!(
            d.handle(&from_admin("✍️ Задать вопрос", None)),
            Outcome::Report { .. }
        ));
    }

    #[test]
    fn test_admin_start_gets_help() {
        let d = dispatcher(CorrelationStrategy::SideTable);
        match d.handle(&from_admin("/help", None)) {
            Outcome::Reply(reply) => {
                assert_eq!(reply.chat_id, ADMIN as i64);
                assert!(reply.text.contains("/start"));
                assert!(reply.keyboard.is_none());
            }
            other => panic!("expected help, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_strategy_still_relays_questions() {
        let d = dispatcher(CorrelationStrategy::Disabled);
        assert!(matches!(
            d.handle(&from_user("Is this serious?")),
            Outcome::Relay { .. }
        ));
        assert_eq!(
            d.handle(&from_admin("ID: 12345\n\nNo", None)),
            Outcome::Ignored(IgnoreReason::Unaddressed)
        );
    }
}
