//! Persistence layer: JSON-file storage for user records.

pub mod record;
pub mod user_store;

pub use record::{RecordPatch, UserRecord, fields};
pub use user_store::UserStore;
