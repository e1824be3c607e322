//! Channel trait and the message types that cross it.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A `/command`, name without the slash and without a `@botname` suffix.
    Command { name: String, args: String },
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    /// An inline keyboard press.
    Callback { data: String, message_id: i64 },
}

/// An inbound event tagged with who sent it and where.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: i64, chat_id: i64, payload: Payload) -> Self {
        Self {
            channel: channel.to_string(),
            user_id,
            chat_id,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Text message; `/command args` becomes a command payload.
    pub fn text(channel: &str, user_id: i64, chat_id: i64, text: &str) -> Self {
        Self::new(channel, user_id, chat_id, parse_text(text))
    }
}

/// Split text into a command or plain text payload.
pub fn parse_text(text: &str) -> Payload {
    if let Some(rest) = text.strip_prefix('/') {
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);
        if !name.is_empty() {
            return Payload::Command {
                name: name.to_string(),
                args: args.trim().to_string(),
            };
        }
    }
    Payload::Text(text.to_string())
}

/// Keyboard attached to an outgoing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Persistent reply keyboard; presses arrive as plain text.
    Reply(Vec<Vec<String>>),
    /// Buttons under the message; presses arrive as callbacks `(label, data)`.
    Inline(Vec<Vec<(String, String)>>),
}

/// Where a photo comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// Local file uploaded with the request.
    Path(PathBuf),
    /// Photo already on the platform, re-sent by id.
    FileId(String),
}

/// One outbound operation. Text is HTML markup and passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    Photo {
        photo: PhotoSource,
        caption: Option<String>,
    },
    EditText {
        message_id: i64,
        text: String,
    },
    Typing,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver one outbound operation to `chat_id`.
    async fn send(&self, chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_text() {
        assert_eq!(parse_text("hello"), Payload::Text("hello".into()));
        assert_eq!(parse_text("/"), Payload::Text("/".into()));
    }

    #[test]
    fn parse_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_text("/start@ekolina_bot"),
            Payload::Command {
                name: "start".into(),
                args: String::new()
            }
        );
        assert_eq!(
            parse_text("/notify  now please"),
            Payload::Command {
                name: "notify".into(),
                args: "now please".into()
            }
        );
    }

    #[test]
    fn incoming_text_sets_ids() {
        let msg = IncomingMessage::text("telegram", 10, 20, "hi");
        assert_eq!(msg.user_id, 10);
        assert_eq!(msg.chat_id, 20);
        assert_eq!(msg.payload, Payload::Text("hi".into()));
    }
}
