use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a message left its chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteReason {
    /// Removed by a caller.
    Explicit,
    /// Its auto-delete timer fired.
    Expired,
}

/// Change notifications published by the chat store after every applied
/// mutation. Consumers re-query the store for the new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A chat was created
    ChatCreated { chat_id: Uuid },

    /// A chat and all its messages were removed
    ChatDeleted { chat_id: Uuid },

    /// A chat's settings were replaced
    SettingsUpdated { chat_id: Uuid },

    /// A message was appended to a chat
    MessageCreate {
        chat_id: Uuid,
        message_id: Uuid,
        sender_id: String,
    },

    /// A message was removed, either explicitly or by its timer
    MessageDelete {
        chat_id: Uuid,
        message_id: Uuid,
        reason: DeleteReason,
    },

    /// An inbound message was read for the first time
    MessageRead {
        chat_id: Uuid,
        message_id: Uuid,
        reader_id: String,
    },

    /// A user's reaction was added
    ReactionAdd {
        chat_id: Uuid,
        message_id: Uuid,
        user_id: String,
        emoji: String,
    },

    /// A user's reaction was removed
    ReactionRemove {
        chat_id: Uuid,
        message_id: Uuid,
        user_id: String,
        emoji: String,
    },

    /// A message was pinned or unpinned
    PinUpdate {
        chat_id: Uuid,
        message_id: Uuid,
        pinned: bool,
    },

    /// The active typer of a chat changed; `None` means nobody is typing
    TypingUpdate {
        chat_id: Uuid,
        user_id: Option<String>,
    },

    /// The contact list changed
    ContactsUpdate,
}

impl ChatEvent {
    /// Returns the chat_id if this event is scoped to a specific chat.
    /// Events that return `None` concern the whole store.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::ChatCreated { chat_id }
            | Self::ChatDeleted { chat_id }
            | Self::SettingsUpdated { chat_id }
            | Self::MessageCreate { chat_id, .. }
            | Self::MessageDelete { chat_id, .. }
            | Self::MessageRead { chat_id, .. }
            | Self::ReactionAdd { chat_id, .. }
            | Self::ReactionRemove { chat_id, .. }
            | Self::PinUpdate { chat_id, .. }
            | Self::TypingUpdate { chat_id, .. } => Some(*chat_id),
            Self::ContactsUpdate => None,
        }
    }
}
