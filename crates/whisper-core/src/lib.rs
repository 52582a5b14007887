//! Ephemeral chat engine: chats, messages and contacts of one local user,
//! with auto-deleting messages, reactions, read receipts, pins and typing
//! indicators.
//!
//! [`ChatStore`] is the entry point. The free functions in [`reactions`],
//! [`receipts`] and [`pins`] are the pure rules it applies.

pub mod config;
pub mod contacts;
pub mod error;
mod persist;
pub mod pins;
pub mod reactions;
pub mod receipts;
pub mod scheduler;
pub mod store;
mod timers;
pub mod typing;

pub use config::StoreConfig;
pub use contacts::{ContactBook, ContactPatch};
pub use error::{ChatError, Result};
pub use reactions::{ReactionChange, toggle_reaction};
pub use scheduler::{DeleteKey, DeleteScheduler};
pub use store::ChatStore;
pub use typing::{DEFAULT_TYPING_WINDOW, TypingTracker};
