use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// How updates reach the bot.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Webhook,
    Polling,
}

impl std::fmt::Display for ServerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerMode::Webhook => write!(f, "webhook"),
            ServerMode::Polling => write!(f, "polling"),
        }
    }
}

impl std::str::FromStr for ServerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(ServerMode::Webhook),
            "polling" => Ok(ServerMode::Polling),
            other => anyhow::bail!("unknown server mode: {other}"),
        }
    }
}

/// How administrator replies are matched to the user who asked.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrategy {
    /// In-memory map from relayed message id to the asking user.
    #[default]
    SideTable,
    /// `ID: <n>` marker parsed out of message text.
    TextEmbedding,
    /// Administrator replies are never routed.
    Disabled,
}

impl std::fmt::Display for CorrelationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationStrategy::SideTable => write!(f, "side_table"),
            CorrelationStrategy::TextEmbedding => write!(f, "text_embedding"),
            CorrelationStrategy::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub correlation: CorrelationConfig,
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub admin_id: u64,
    /// Used to accept `/start@botname`; fetched with getMe when not configured.
    pub bot_username: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: ServerMode,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public base URL Telegram should call, e.g. `https://relay.example.com`.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub webhook_path: Option<String>,
    #[serde(default)]
    pub secret_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub strategy: CorrelationStrategy,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// On a side-table miss, try the `ID:` marker in the replied-to text.
    #[serde(default = "default_text_fallback")]
    pub text_fallback: bool,
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_welcome")]
    pub welcome: String,
    /// Reply-keyboard button text; sending it asks for a prompt instead of relaying.
    #[serde(default = "default_trigger")]
    pub trigger: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_thanks")]
    pub thanks: String,
    #[serde(default = "default_answer_header")]
    pub answer_header: String,
}

/// On-disk shape. Everything is optional so the file can be omitted entirely.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    telegram: FileTelegram,
    server: Option<ServerConfig>,
    correlation: Option<CorrelationConfig>,
    messages: Option<MessagesConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileTelegram {
    bot_token: Option<String>,
    admin_id: Option<u64>,
    bot_username: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_entries() -> usize {
    10_000
}

fn default_text_fallback() -> bool {
    true
}

fn default_sweep_cron() -> String {
    "0 * * * * *".to_string()
}

fn default_welcome() -> String {
    "👋 Добро пожаловать! Я бот-врач.\nНажмите кнопку или напишите вопрос:".to_string()
}

fn default_trigger() -> String {
    "✍️ Задать вопрос".to_string()
}

fn default_prompt() -> String {
    "Пожалуйста, напишите свой вопрос 👇".to_string()
}

fn default_thanks() -> String {
    "✅ Спасибо за вопрос! Врач обязательно посмотрит его 👨‍⚕️".to_string()
}

fn default_answer_header() -> String {
    "👨‍⚕️ Ответ врача:".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::default(),
            bind: default_bind(),
            public_url: None,
            webhook_path: None,
            secret_token: None,
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            strategy: CorrelationStrategy::default(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            text_fallback: default_text_fallback(),
            sweep_cron: default_sweep_cron(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            trigger: default_trigger(),
            prompt: default_prompt(),
            thanks: default_thanks(),
            answer_header: default_answer_header(),
        }
    }
}

impl CorrelationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Path the webhook route is mounted on. Defaults to `/<bot_token>`.
    pub fn webhook_path(&self) -> String {
        match self.server.webhook_path.as_deref() {
            Some(path) if !path.is_empty() => {
                if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("/{path}")
                }
            }
            _ => format!("/{}", self.telegram.bot_token),
        }
    }

    /// Full URL to register with setWebhook, if a public URL is known.
    pub fn webhook_url(&self) -> Option<String> {
        let base = self.server.public_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}{}", base, self.webhook_path()))
    }

    /// Load from `path` (if it exists) and apply environment overrides.
    ///
    /// A missing file is only an error when `required` is set, so the bot can run from
    /// environment variables alone.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let content = if path.exists() {
            Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            )
        } else if required {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            None
        };

        Self::from_sources(content.as_deref(), |name| std::env::var(name).ok())
    }

    /// Build a config from optional TOML text plus an environment lookup.
    pub fn from_sources<F>(content: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match content {
            Some(text) => toml::from_str(text).context("Failed to parse config file")?,
            None => FileConfig::default(),
        };

        let lookup = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let bot_token = lookup("BOT_TOKEN")
            .or(file.telegram.bot_token.filter(|t| !t.is_empty()))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let admin_id = match lookup("ADMIN_ID") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidId {
                    name: "ADMIN_ID",
                    value: raw.clone(),
                })?,
            None => file.telegram.admin_id.ok_or(ConfigError::Missing("ADMIN_ID"))?,
        };

        let mut server = file.server.unwrap_or_default();
        if let Some(url) = lookup("WEBHOOK_URL") {
            server.public_url = Some(url);
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            server.secret_token = Some(secret);
        }
        if let Some(mode) = lookup("RELAY_MODE") {
            server.mode = mode.parse()?;
        }
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {port:?}"))?;
            let host = server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            server.bind = format!("{host}:{port}");
        }

        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                admin_id,
                bot_username: file.telegram.bot_username,
            },
            server,
            correlation: file.correlation.unwrap_or_default(),
            messages: file.messages.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_only_uses_defaults() {
        let config =
            Config::from_sources(None, env_of(&[("BOT_TOKEN", "123:abc"), ("ADMIN_ID", "42")]))
                .unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.admin_id, 42);
        assert_eq!(config.server.mode, ServerMode::Webhook);
        assert_eq!(config.correlation.strategy, CorrelationStrategy::SideTable);
        assert_eq!(config.messages.trigger, "✍️ Задать вопрос");
        assert_eq!(config.webhook_path(), "/123:abc");
        assert!(config.webhook_url().is_none());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Config::from_sources(None, env_of(&[("ADMIN_ID", "42")])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing("BOT_TOKEN"))
        ));
    }

    #[test]
    fn test_missing_admin_is_fatal() {
        let err = Config::from_sources(None, env_of(&[("BOT_TOKEN", "t")])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing("ADMIN_ID"))
        ));
    }

    #[test]
    fn test_blank_env_counts_as_missing() {
        let err = Config::from_sources(None, env_of(&[("BOT_TOKEN", "  "), ("ADMIN_ID", "1")]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Missing("BOT_TOKEN"))
        ));
    }

    #[test]
    fn test_non_numeric_admin_id_rejected() {
        let err = Config::from_sources(None, env_of(&[("BOT_TOKEN", "t"), ("ADMIN_ID", "doc")]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_file_values_and_env_override() {
        let toml = r#"
[telegram]
bot_token = "file-token"
admin_id = 7

[server]
mode = "polling"
bind = "127.0.0.1:3000"
public_url = "https://relay.example.com/"
webhook_path = "hook"

[correlation]
strategy = "text_embedding"
ttl_secs = 60
text_fallback = false

[messages]
thanks = "Thanks!"
"#;
        let config = Config::from_sources(Some(toml), env_of(&[("PORT", "9999")])).unwrap();
        assert_eq!(config.telegram.bot_token, "file-token");
        assert_eq!(config.telegram.admin_id, 7);
        assert_eq!(config.server.mode, ServerMode::Polling);
        assert_eq!(config.server.bind, "127.0.0.1:9999");
        assert_eq!(config.correlation.strategy, CorrelationStrategy::TextEmbedding);
        assert_eq!(config.correlation.ttl(), Duration::from_secs(60));
        assert!(!config.correlation.text_fallback);
        assert_eq!(config.correlation.max_entries, 10_000);
        assert_eq!(config.messages.thanks, "Thanks!");
        assert_eq!(config.messages.prompt, "Пожалуйста, напишите свой вопрос 👇");
        assert_eq!(config.webhook_path(), "/hook");
        assert_eq!(
            config.webhook_url().as_deref(),
            Some("https://relay.example.com/hook")
        );

        let overridden = Config::from_sources(
            Some(toml),
            env_of(&[("ADMIN_ID", "99"), ("RELAY_MODE", "webhook")]),
        )
        .unwrap();
        assert_eq!(overridden.telegram.admin_id, 99);
        assert_eq!(overridden.server.mode, ServerMode::Webhook);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(Config::from_sources(Some("[telegram"), env_of(&[])).is_err());
    }
}
