//! Application context: everything a handler needs, built once at startup.

use std::sync::Arc;

use crate::broadcast::BroadcastGate;
use crate::channels::Channel;
use crate::config::BotConfig;
use crate::dialogue::{DialogueEngine, SessionTable};
use crate::store::UserStore;

/// Shared state passed to every handler.
pub struct AppContext {
    pub config: BotConfig,
    pub store: Arc<UserStore>,
    pub sessions: SessionTable,
    pub broadcasts: BroadcastGate,
    pub engine: DialogueEngine,
    pub channel: Arc<dyn Channel>,
}

impl AppContext {
    pub fn new(config: BotConfig, store: Arc<UserStore>, channel: Arc<dyn Channel>) -> Self {
        let engine = DialogueEngine::new(config.greeting_photo.clone(), config.message_delay);
        Self {
            config,
            store,
            sessions: SessionTable::new(),
            broadcasts: BroadcastGate::new(),
            engine,
            channel,
        }
    }
}
