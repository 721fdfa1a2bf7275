//! The `ID: <number>` text marker.
//!
//! Relayed questions carry the asking user's id in their header, and the administrator can
//! answer by writing the same marker followed by a blank line and the answer.

use crate::error::CorrelationError;

pub const ID_MARKER: &str = "ID:";
pub const BODY_SEPARATOR: &str = "\n\n";

/// `ID: <sender_id>` followed by a blank line and `body`.
pub fn embed(sender_id: u64, body: &str) -> String {
    format!("{ID_MARKER} {sender_id}{BODY_SEPARATOR}{body}")
}

/// Text of a question relayed to the administrator.
pub fn relay_text(sender_id: u64, username: Option<&str>, text: &str) -> String {
    let handle = match username {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => sender_id.to_string(),
    };
    format!("📩 Вопрос от @{handle} ({ID_MARKER} {sender_id}):{BODY_SEPARATOR}{text}")
}

/// Byte offset of the first `ID:` that starts a token: at the start of the text or right
/// after whitespace or `(`. `COVID:` and `PAID:` are not markers.
fn find_marker(text: &str) -> Option<usize> {
    text.match_indices(ID_MARKER).map(|(at, _)| at).find(|&at| {
        text[..at]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == '(')
    })
}

/// Extract `(sender_id, body)` from text containing a marker.
///
/// Only punctuation may sit between the id and the blank line, which lets the relay header
/// `(ID: 42):` parse the same way as a bare `ID: 42`. Ids must fit a Telegram chat id.
pub fn parse(text: &str) -> Result<(u64, &str), CorrelationError> {
    let start = find_marker(text).ok_or(CorrelationError::MissingMarker)?;
    let rest = text[start + ID_MARKER.len()..].trim_start_matches(' ');

    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return Err(CorrelationError::InvalidId);
    }
    let sender_id: u64 = rest[..digits]
        .parse()
        .map_err(|_| CorrelationError::InvalidId)?;
    if i64::try_from(sender_id).is_err() {
        return Err(CorrelationError::InvalidId);
    }

    let after_id = &rest[digits..];
    let separator = after_id
        .find(BODY_SEPARATOR)
        .ok_or(CorrelationError::MissingBody)?;
    if after_id[..separator].chars().any(char::is_alphanumeric) {
        return Err(CorrelationError::InvalidId);
    }

    let body = &after_id[separator + BODY_SEPARATOR.len()..];
    if body.trim().is_empty() {
        return Err(CorrelationError::EmptyBody);
    }
    Ok((sender_id, body))
}
