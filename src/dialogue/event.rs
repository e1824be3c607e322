//! Inputs and outputs of the state machine.

use std::time::Duration;

use crate::channels::{OutgoingMessage, Payload};
use crate::store::RecordPatch;

use super::state::ConversationState;

/// An inbound event as the state machine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/start`
    Start,
    /// `/notify`
    Notify,
    /// Any other command.
    Command(String),
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Callback {
        data: String,
        message_id: i64,
    },
}

impl From<&Payload> for Event {
    fn from(payload: &Payload) -> Self {
        match payload {
            Payload::Command { name, .. } => match name.as_str() {
                "start" => Self::Start,
                "notify" => Self::Notify,
                other => Self::Command(other.to_string()),
            },
            Payload::Text(text) => Self::Text(text.clone()),
            Payload::Photo { file_id, caption } => Self::Photo {
                file_id: file_id.clone(),
                caption: caption.clone(),
            },
            Payload::Callback { data, message_id } => Self::Callback {
                data: data.clone(),
                message_id: *message_id,
            },
        }
    }
}

/// One outbound step, executed in order against the user's chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(OutgoingMessage),
    /// Scripted pause between messages.
    Pause(Duration),
}

impl Effect {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Send(OutgoingMessage::text(text))
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub effects: Vec<Effect>,
    /// Fields to write before the effects are delivered. `Some` with no
    /// fields still creates the record.
    pub patch: Option<RecordPatch>,
}

impl Transition {
    pub fn to(next: ConversationState) -> Self {
        Self {
            next,
            effects: Vec::new(),
            patch: None,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_patch(mut self, patch: RecordPatch) -> Self {
        self.patch = Some(patch);
        self
    }

    /// Texts of all plain or keyboard messages, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(OutgoingMessage::Text { text, .. }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
