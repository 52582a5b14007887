use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatKind, ChatSettings, Message, MessageMetadata, MessageType, PresenceState};

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub participant_id: String,
    #[serde(default = "default_chat_kind")]
    pub kind: ChatKind,
}

fn default_chat_kind() -> ChatKind {
    ChatKind::Private
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSettingsRequest {
    pub settings: ChatSettings,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Plaintext of a message as far as the local user can read it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    Readable(String),
    /// Opening the ciphertext failed; the rest of the chat still renders.
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub body: MessageBody,
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub reader_id: Option<String>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
    pub user_id: Option<String>,
}

// -- Pins --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPinnedRequest {
    pub pinned: bool,
}

// -- Typing --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTypingRequest {
    pub is_typing: bool,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TypingResponse {
    pub chat_id: Uuid,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub chat_id: Uuid,
    pub unread: usize,
}

// -- Contacts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddContactRequest {
    pub id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    pub q: Option<String>,
}

/// Partial contact update; absent fields are left as they are.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateContactRequest {
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_blocked: Option<bool>,
    pub presence_state: Option<PresenceState>,
}

// -- Events --

/// Narrows the event stream to one chat. Store-wide events are always sent.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub chat_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TotalUnreadResponse {
    pub unread: usize,
}
