pub mod marker;
pub mod side_table;

use std::time::Instant;

use tracing::debug;

use crate::config::{CorrelationConfig, CorrelationStrategy};
use crate::error::CorrelationError;
use crate::platform::{MessageId, RepliedMessage};

pub use side_table::{PendingQuestion, SideTable};

/// How an administrator reply was matched to its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward metadata on the replied-to message named the user.
    Forwarded,
    /// The replied-to message was found in the side table under `key`.
    SideTable { key: MessageId },
    /// An `ID:` marker in the text named the user.
    Marker,
}

/// Where an administrator message should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub chat_id: i64,
    pub body: String,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Routed(Routing),
    Failed(CorrelationError),
    /// Not an answer to anything (e.g. a plain message in side-table mode).
    Unaddressed,
}

/// Matches administrator replies to the users who asked.
pub struct Correlator {
    strategy: CorrelationStrategy,
    text_fallback: bool,
    table: SideTable,
}

impl Correlator {
    pub fn new(config: &CorrelationConfig) -> Self {
        Self {
            strategy: config.strategy,
            text_fallback: config.text_fallback,
            table: SideTable::new(config.ttl(), config.max_entries),
        }
    }

    pub fn strategy(&self) -> CorrelationStrategy {
        self.strategy
    }

    pub fn side_table(&self) -> &SideTable {
        &self.table
    }

    /// Record a relayed question. Only the side-table strategy keeps state.
    pub fn remember(&self, relayed_id: MessageId, question: PendingQuestion) {
        if self.strategy == CorrelationStrategy::SideTable {
            debug!(
                "Tracking question from {} as message {}",
                question.sender_label, relayed_id
            );
            self.table.insert(relayed_id, question);
        }
    }

    /// Called once an answer routed through `route` reached the user.
    pub fn delivered(&self, route: Route) {
        if let Route::SideTable { key } = route {
            self.table.complete(key);
        }
    }

    /// Whether an administrator can address a user by typing an `ID:` marker.
    pub fn accepts_marker(&self) -> bool {
        match self.strategy {
            CorrelationStrategy::TextEmbedding => true,
            CorrelationStrategy::SideTable => self.text_fallback,
            CorrelationStrategy::Disabled => false,
        }
    }

    /// Work out who an administrator message `text` is addressed to.
    pub fn resolve(
        &self,
        text: &str,
        reply_to: Option<&RepliedMessage>,
        now: Instant,
    ) -> Resolution {
        if self.strategy == CorrelationStrategy::Disabled {
            return Resolution::Unaddressed;
        }

        // Only present when the platform kept the original author on the forward
        if let Some(user_id) = reply_to.and_then(|r| r.forwarded_from) {
            return routed(user_id, text, Route::Forwarded);
        }

        match self.strategy {
            CorrelationStrategy::SideTable => self.resolve_side_table(text, reply_to, now),
            CorrelationStrategy::TextEmbedding => resolve_marker(text, reply_to),
            CorrelationStrategy::Disabled => Resolution::Unaddressed,
        }
    }

    fn resolve_side_table(
        &self,
        text: &str,
        reply_to: Option<&RepliedMessage>,
        now: Instant,
    ) -> Resolution {
        let Some(replied) = reply_to else {
            if self.text_fallback {
                return resolve_marker(text, None);
            }
            return Resolution::Failed(CorrelationError::UnknownQuestion);
        };

        if let Some(question) = self.table.lookup(replied.message_id, now) {
            return Resolution::Routed(Routing {
                chat_id: question.chat_id,
                body: text.to_string(),
                route: Route::SideTable {
                    key: replied.message_id,
                },
            });
        }

        if self.text_fallback {
            if let Some(Ok((sender_id, _))) = replied.text.as_deref().map(marker::parse) {
                return routed(sender_id, text, Route::Marker);
            }
        }

        Resolution::Failed(CorrelationError::UnknownQuestion)
    }
}

/// Marker in the administrator's own text first, then in the message being replied to.
fn resolve_marker(text: &str, reply_to: Option<&RepliedMessage>) -> Resolution {
    let own = match marker::parse(text) {
        Ok((sender_id, body)) => return routed(sender_id, body, Route::Marker),
        Err(e) => e,
    };

    match reply_to.and_then(|r| r.text.as_deref()) {
        Some(replied) => match marker::parse(replied) {
            Ok((sender_id, _)) => routed(sender_id, text, Route::Marker),
            Err(e) => Resolution::Failed(e),
        },
        None => Resolution::Failed(own),
    }
}

/// Private chats share the user's id; ids past `i64::MAX` name no chat.
fn routed(user_id: u64, body: &str, route: Route) -> Resolution {
    match i64::try_from(user_id) {
        Ok(chat_id) => Resolution::Routed(Routing {
            chat_id,
            body: body.to_string(),
            route,
        }),
        Err(_) => Resolution::Failed(CorrelationError::InvalidId),
    }
}
