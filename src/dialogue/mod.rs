//! Dialogue system: onboarding and lab worksheet conversation.
//!
//! The conversation is one explicit state machine. `DialogueEngine` maps
//! `(state, event, record)` to a `Transition`; the dispatcher applies the
//! record patch, delivers the effects and stores the new state in the
//! user's `Session`.

pub mod engine;
pub mod event;
pub mod prompts;
pub mod session;
pub mod state;
pub mod validate;

pub use engine::DialogueEngine;
pub use event::{Effect, Event, Transition};
pub use session::{Session, SessionGuard, SessionTable};
pub use state::{BenefitSlot, ConversationState, EntryMode};
pub use validate::validate_name;
