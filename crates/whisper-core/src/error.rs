//! Error kinds surfaced by the chat store.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No chat with this id.
    #[error("chat not found: {0}")]
    ChatNotFound(Uuid),

    /// No message with this id in the chat.
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    /// Unknown or blocked contact, or a sender outside the chat.
    #[error("invalid participant: {0}")]
    InvalidParticipant(String),

    #[error("contact not found: {0}")]
    ContactNotFound(String),

    /// Sealing failed; the message was not stored.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed for message {message_id}: {reason}")]
    DecryptionFailed { message_id: Uuid, reason: String },

    /// The in-memory change was applied but could not be written out.
    #[error("failed to persist `{key}`: {reason}")]
    PersistenceWriteFailed { key: &'static str, reason: String },

    #[error("stored `{key}` is corrupt: {reason}")]
    PersistenceReadCorrupt { key: &'static str, reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, ChatError>;
