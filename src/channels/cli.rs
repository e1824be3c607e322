//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Every line is sent as one local user. `/cmd` is a command, `#data`
//! presses an inline button with that callback data, anything else is text.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingMessage, Payload, PhotoSource,
    parse_text,
};
use crate::error::ChannelError;

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user_id: i64,
    /// Id of the last message printed, so `#data` presses can reference it.
    last_message_id: Arc<AtomicI64>,
}

impl CliChannel {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            last_message_id: Arc::new(AtomicI64::new(0)),
        }
    }
}

/// Turn one input line into a payload.
fn parse_line(line: &str, last_message_id: i64) -> Payload {
    match line.strip_prefix('#') {
        Some(data) if !data.is_empty() => Payload::Callback {
            data: data.to_string(),
            message_id: last_message_id,
        },
        _ => parse_text(line),
    }
}

/// Render a keyboard below a printed message.
fn render_keyboard(keyboard: &Keyboard) -> String {
    match keyboard {
        Keyboard::Reply(rows) => rows
            .iter()
            .map(|row| format!("  [ {} ]", row.join(" | ")))
            .collect::<Vec<_>>()
            .join("\n"),
        Keyboard::Inline(rows) => rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(label, data)| format!("  ({label}) #{data}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_id = self.user_id;
        let last_message_id = Arc::clone(&self.last_message_id);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        if line == "/quit" || line == "/exit" {
                            break;
                        }
                        let payload =
                            parse_line(&line, last_message_id.load(Ordering::Relaxed));
                        let msg = IncomingMessage::new("cli", user_id, user_id, payload);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _chat_id: i64, message: OutgoingMessage) -> Result<(), ChannelError> {
        match message {
            OutgoingMessage::Text { text, keyboard } => {
                let id = self.last_message_id.fetch_add(1, Ordering::Relaxed) + 1;
                println!("\n[{id}] {text}");
                if let Some(kb) = keyboard {
                    println!("{}", render_keyboard(&kb));
                }
            }
            OutgoingMessage::Photo { photo, caption } => {
                let source = match photo {
                    PhotoSource::Path(path) => path.display().to_string(),
                    PhotoSource::FileId(id) => id,
                };
                println!("\n🖼  {source}");
                if let Some(caption) = caption {
                    println!("{caption}");
                }
            }
            OutgoingMessage::EditText { message_id, text } => {
                println!("\n[{message_id} edited] {text}");
            }
            OutgoingMessage::Typing => eprintln!("…"),
        }
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
