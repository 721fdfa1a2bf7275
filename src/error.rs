use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set (use the environment variable or the config file)")]
    Missing(&'static str),

    #[error("{name} must be a numeric Telegram id, got {value:?}")]
    InvalidId { name: &'static str, value: String },
}

/// Why an administrator reply could not be routed to a user.
///
/// These are reported back to the administrator and never abort processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("no `ID: <number>` marker found")]
    MissingMarker,

    #[error("the value after `ID:` is not a valid user id")]
    InvalidId,

    #[error("no blank line separating the marker from the answer")]
    MissingBody,

    #[error("the answer text is empty")]
    EmptyBody,

    #[error("the question you replied to is unknown or has expired")]
    UnknownQuestion,
}

/// Failure reported by the outbound messaging client.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error("{0}")]
    Message(String),
}

impl PlatformError {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
