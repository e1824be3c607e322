//! Admin broadcast: `/notify` arms a one-shot fan-out to every user.

use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::channels::{Channel, OutgoingMessage, PhotoSource};
use crate::dialogue::Event;
use crate::store::UserStore;

/// What an armed admin asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastContent {
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
}

impl BroadcastContent {
    /// Text and photo messages can be broadcast; nothing else.
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Text(text) => Some(Self::Text(text.clone())),
            Event::Photo { file_id, caption } => Some(Self::Photo {
                file_id: file_id.clone(),
                caption: caption.clone(),
            }),
            _ => None,
        }
    }

    fn to_message(&self) -> OutgoingMessage {
        match self {
            Self::Text(text) => OutgoingMessage::text(text.clone()),
            Self::Photo { file_id, caption } => OutgoingMessage::Photo {
                photo: PhotoSource::FileId(file_id.clone()),
                caption: caption.clone(),
            },
        }
    }
}

/// Admins currently waiting to send a broadcast.
#[derive(Debug, Default)]
pub struct BroadcastGate {
    armed: Mutex<HashSet<i64>>,
}

impl BroadcastGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the flag for `admin_id`.
    pub async fn arm(&self, admin_id: i64) {
        self.armed.lock().await.insert(admin_id);
    }

    pub async fn is_armed(&self, admin_id: i64) -> bool {
        self.armed.lock().await.contains(&admin_id)
    }

    /// Disarm and report whether the flag was set.
    pub async fn take(&self, admin_id: i64) -> bool {
        self.armed.lock().await.remove(&admin_id)
    }
}

/// Send `content` to every stored user that is not an admin.
///
/// Returns the number of attempted sends. Failed sends are logged and do not
/// stop the fan-out.
pub async fn fan_out(
    channel: &dyn Channel,
    store: &UserStore,
    admin_ids: &HashSet<i64>,
    content: &BroadcastContent,
) -> usize {
    let message = content.to_message();
    let mut attempted = 0;

    for raw_id in store.all_user_ids().await {
        let Ok(user_id) = raw_id.parse::<i64>() else {
            tracing::warn!(user_id = %raw_id, "Skipping non-numeric user id in broadcast");
            continue;
        };
        if admin_ids.contains(&user_id) {
            continue;
        }

        attempted += 1;
        if let Err(e) = channel.send(user_id, message.clone()).await {
            tracing::warn!(user_id, error = %e, "Broadcast delivery failed");
        }
    }

    tracing::info!(attempted, "Broadcast finished");
    attempted
}
