//! Webhook endpoint.
//!
//! Telegram POSTs every update to a single path (by default `/<bot_token>`). Updates are
//! processed before the response is sent and always acknowledged with `200 ok`, except
//! when a configured secret token does not match.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use teloxide::payloads::SetWebhookSetters;
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tracing::{debug, info, warn};

use crate::bot::AppState;
use crate::config::Config;
use crate::platform::telegram::incoming_from_message;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    app: Arc<AppState>,
    secret_token: Option<String>,
}

/// Router with the single webhook route.
pub fn router(app: Arc<AppState>, path: &str, secret_token: Option<String>) -> Router {
    Router::new()
        .route(path, post(webhook))
        .with_state(WebhookState { app, secret_token })
}

/// Compare the header with the configured token without stopping at the first difference.
fn secret_matches(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0, |acc, (x, y)| acc | (x ^ y))
            == 0
}

async fn webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(expected) = state.secret_token.as_deref() {
        let given = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secret_matches(given, expected) {
            warn!("Rejected webhook call with a wrong secret token");
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Ignoring unparseable update: {}", e);
            return (StatusCode::OK, "ok");
        }
    };

    match update.kind {
        UpdateKind::Message(msg) => match incoming_from_message(&msg) {
            Some(incoming) => state.app.process(&incoming).await,
            None => debug!("Ignoring non-text message in update {}", update.id.0),
        },
        _ => debug!("Ignoring update {} of another kind", update.id.0),
    }

    (StatusCode::OK, "ok")
}

/// Point Telegram at our webhook URL.
pub async fn register_webhook(bot: &Bot, url: &str, secret_token: Option<&str>) -> Result<()> {
    let url = reqwest::Url::parse(url).with_context(|| format!("Invalid webhook URL: {url}"))?;
    let mut request = bot.set_webhook(url);
    if let Some(secret) = secret_token {
        request = request.secret_token(secret.to_string());
    }
    request.await.context("setWebhook failed")?;
    info!("Webhook registered");
    Ok(())
}

/// Serve the webhook until Ctrl-C.
pub async fn serve(app: Arc<AppState>, config: &Config) -> Result<()> {
    let router = router(app, &config.webhook_path(), config.server.secret_token.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;

    info!("Webhook server listening on {}", config.server.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down webhook server");
        })
        .await
        .context("Server error")?;

    Ok(())
}
