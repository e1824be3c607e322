//! Telegram channel: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation on top of `reqwest`, adapted to
//! the bot's Channel trait (MessageStream, send).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage, Payload, PhotoSource,
    parse_text,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause before polling again after a failed `getUpdates`.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel that connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    /// POST a JSON body and fail on a non-success status.
    async fn call(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!("{method} returned {status}: {err}")));
        }
        Ok(())
    }

    /// Send a text message, HTML first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit; the
    /// keyboard goes on the last chunk.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { keyboard } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), HTML-first with fallback.
    async fn send_message_chunk(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let mut html_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML"
        });
        if let Some(kb) = keyboard {
            html_body["reply_markup"] = keyboard_markup(kb);
        }

        let html_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&html_body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if html_resp.status().is_success() {
            return Ok(());
        }

        let html_status = html_resp.status();
        let _html_err = html_resp.text().await.unwrap_or_default();
        tracing::warn!(
            status = ?html_status,
            chat_id,
            "Telegram sendMessage with HTML failed; retrying without parse_mode"
        );

        // Retry without parse_mode
        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = keyboard_markup(kb);
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!(
                "sendMessage failed (html: {}, plain: {})",
                html_status, plain_err
            )));
        }

        Ok(())
    }

    /// Upload a local photo to a Telegram chat.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        file_path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.jpg");

        let file_bytes = tokio::fs::read(file_path).await?;
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);

        if let Some(cap) = caption {
            form = form
                .text("caption", cap.to_string())
                .text("parse_mode", "HTML");
        }

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!("sendPhoto failed: {err}")));
        }

        tracing::info!(chat_id, file_name, "Telegram photo sent");
        Ok(())
    }

    /// Re-send a photo already stored by Telegram.
    pub async fn send_photo_by_id(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "photo": file_id
        });

        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
            body["parse_mode"] = Value::String("HTML".into());
        }

        self.call("sendPhoto", &body).await
    }

    /// Replace the text of a message the bot sent earlier.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML"
        });
        self.call("editMessageText", &body).await
    }

    /// Show the "typing…" indicator.
    pub async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing"
        });
        self.call("sendChatAction", &body).await
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let url = api_url(&bot_token, "getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(%status, body, "Telegram getUpdates rejected");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let results = match update_batch(&data) {
                    Ok(results) => results,
                    Err(reason) => {
                        tracing::warn!(reason, "Telegram getUpdates returned no updates");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        tracing::debug!("Telegram: skipping unsupported update");
                        continue;
                    };

                    // Clear the button's loading spinner right away.
                    if let Some(callback_id) = parsed.callback_id {
                        let client = client.clone();
                        let url = api_url(&bot_token, "answerCallbackQuery");
                        tokio::spawn(async move {
                            let body = serde_json::json!({ "callback_query_id": callback_id });
                            if let Err(e) = client.post(&url).json(&body).send().await {
                                tracing::warn!("Telegram answerCallbackQuery failed: {e}");
                            }
                        });
                    }

                    if tx.send(parsed.message).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError> {
        match message {
            OutgoingMessage::Text { text, keyboard } => {
                self.send_message(chat_id, &text, keyboard.as_ref()).await
            }
            OutgoingMessage::Photo {
                photo: PhotoSource::Path(path),
                caption,
            } => self.send_photo(chat_id, &path, caption.as_deref()).await,
            OutgoingMessage::Photo {
                photo: PhotoSource::FileId(file_id),
                caption,
            } => {
                self.send_photo_by_id(chat_id, &file_id, caption.as_deref())
                    .await
            }
            OutgoingMessage::EditText { message_id, text } => {
                self.edit_message_text(chat_id, message_id, &text).await
            }
            OutgoingMessage::Typing => self.send_typing(chat_id).await,
        }
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// The `result` array of a `getUpdates` reply.
///
/// `{"ok": false, ..}` replies and replies without a `result` array are
/// errors described by `error_code` and `description`.
fn update_batch(data: &Value) -> Result<&[Value], String> {
    if data.get("ok").and_then(Value::as_bool) == Some(false) {
        let code = data.get("error_code").and_then(Value::as_i64).unwrap_or_default();
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        return Err(format!("error {code}: {description}"));
    }

    data.get("result")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| "reply has no result array".to_string())
}

/// An update converted to an inbound message.
#[derive(Debug)]
struct ParsedUpdate {
    message: IncomingMessage,
    /// Set for inline button presses, which must be acknowledged.
    callback_id: Option<String>,
}

/// Convert one `getUpdates` entry into an inbound message.
///
/// Handles text, photo and callback-query updates; everything else is `None`.
fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(query) = update.get("callback_query") {
        let user_id = query.get("from")?.get("id")?.as_i64()?;
        let message = query.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let message_id = message.get("message_id")?.as_i64()?;
        let data = query.get("data")?.as_str()?.to_string();
        let callback_id = query.get("id").and_then(Value::as_str).map(String::from);

        return Some(ParsedUpdate {
            message: IncomingMessage::new(
                "telegram",
                user_id,
                chat_id,
                Payload::Callback { data, message_id },
            ),
            callback_id,
        });
    }

    let message = update.get("message")?;
    let user_id = message.get("from")?.get("id")?.as_i64()?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;

    let payload = if let Some(text) = message.get("text").and_then(Value::as_str) {
        parse_text(text)
    } else if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest first.
        let file_id = sizes.last()?.get("file_id")?.as_str()?.to_string();
        let caption = message
            .get("caption")
            .and_then(Value::as_str)
            .map(String::from);
        Payload::Photo { file_id, caption }
    } else {
        return None;
    };

    Some(ParsedUpdate {
        message: IncomingMessage::new("telegram", user_id, chat_id, payload),
        callback_id: None,
    })
}

/// Render a keyboard as Telegram `reply_markup`.
fn keyboard_markup(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Reply(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| serde_json::json!({ "text": label }))
                        .collect()
                })
                .collect();
            serde_json::json!({ "keyboard": rows, "resize_keyboard": true })
        }
        Keyboard::Inline(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(label, data)| {
                            serde_json::json!({ "text": label, "callback_data": data })
                        })
                        .collect()
                })
                .collect();
            serde_json::json!({ "inline_keyboard": rows })
        }
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts. Lengths are
/// counted in characters, and cuts always land on char boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Byte offset of the first char past the limit.
        let limit = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        // Find a good split point
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
