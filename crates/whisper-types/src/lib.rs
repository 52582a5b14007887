//! Whisper shared types.
//!
//! The persisted data model (contacts, chats, messages, reactions), the
//! change notifications the core emits, and the request/response bodies of
//! the local API. No logic beyond small constructors and accessors lives here.

pub mod api;
pub mod events;
pub mod models;

pub use events::{ChatEvent, DeleteReason};
pub use models::{
    Chat, ChatKind, ChatSettings, Contact, Message, MessageMetadata, MessageType,
    PresenceState, Reaction,
};
