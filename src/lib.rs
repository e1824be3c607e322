//! Ekolina: onboarding and lab worksheet chat bot.

pub mod broadcast;
pub mod channels;
pub mod config;
pub mod context;
pub mod dialogue;
pub mod dispatcher;
pub mod error;
pub mod store;
