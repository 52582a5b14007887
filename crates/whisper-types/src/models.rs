use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Contacts --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Away,
    #[default]
    Offline,
}

/// A person the local user can chat with. Chats reference contacts by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: String,
    #[serde(default)]
    pub presence_state: PresenceState,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: String::new(),
            presence_state: PresenceState::Offline,
            last_seen_at: now,
            is_favorite: false,
            is_blocked: false,
            created_at: now,
        }
    }
}

// -- Chats --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    pub auto_delete: bool,
    pub delete_timer_ms: u64,
    pub encryption_enabled: bool,
    #[serde(default)]
    pub muted: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            auto_delete: true,
            delete_timer_ms: 5000,
            encryption_enabled: true,
            muted: false,
        }
    }
}

/// A conversation. `messages` is kept in insertion order, which is also
/// display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub kind: ChatKind,
    pub participant_ids: BTreeSet<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub settings: ChatSettings,
}

impl Chat {
    pub fn new(kind: ChatKind, participant_ids: BTreeSet<String>, settings: ChatSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            participant_ids,
            messages: Vec::new(),
            created_at: now,
            last_activity_at: now,
            settings,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.contains(user_id)
    }

    pub fn message(&self, message_id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn message_mut(&mut self, message_id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Append a message and bump the activity timestamp.
    pub fn push_message(&mut self, message: Message) {
        self.last_activity_at = message.timestamp.max(Utc::now());
        self.messages.push(message);
    }

    /// Remove a message, keeping the order of the rest. Returns the removed
    /// message, or `None` if it was already gone.
    pub fn remove_message(&mut self, message_id: Uuid) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == message_id)?;
        self.last_activity_at = Utc::now();
        Some(self.messages.remove(idx))
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    File,
    Voice,
    Image,
    Video,
    Location,
    Reply,
}

/// Type-specific message fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum MessageMetadata {
    #[default]
    None,
    File {
        file_name: String,
        file_size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Voice {
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_ref: Option<String>,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview_ref: Option<String>,
    },
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview_ref: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    Reply {
        reply_to: Uuid,
        original_message: String,
        original_sender: String,
    },
}

/// A single message. `content` is ciphertext when `encrypted` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default)]
    pub metadata: MessageMetadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub delete_timer_ms: u64,
    #[serde(default)]
    pub encrypted: bool,
}

impl Message {
    /// Build an unread, unpinned message carrying the chat's delete policy
    /// as it is right now.
    pub fn new(
        chat: &Chat,
        sender_id: impl Into<String>,
        content: String,
        kind: MessageType,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id: chat.id,
            sender_id: sender_id.into(),
            content,
            kind,
            metadata,
            timestamp: Utc::now(),
            read: false,
            reactions: Vec::new(),
            is_pinned: false,
            auto_delete: chat.settings.auto_delete,
            delete_timer_ms: chat.settings.delete_timer_ms,
            encrypted: chat.settings.encryption_enabled,
        }
    }

    pub fn reaction(&self, emoji: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.emoji == emoji)
    }

    /// When an ephemeral message is due to disappear.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if !self.auto_delete {
            return None;
        }
        let ttl = chrono::Duration::milliseconds(self.delete_timer_ms.min(i64::MAX as u64) as i64);
        self.timestamp.checked_add_signed(ttl)
    }
}

// -- Reactions --

/// All users who reacted to a message with one emoji. `count` is never
/// stored as truth: it is derived from `user_ids` on read and on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ReactionRecord", into = "ReactionRecord")]
pub struct Reaction {
    pub emoji: String,
    user_ids: Vec<String>,
}

impl Reaction {
    pub fn new(emoji: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            user_ids: vec![user_id.into()],
        }
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn count(&self) -> usize {
        self.user_ids.len()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.user_ids.iter().any(|u| u == user_id)
    }

    /// Returns true if the user was newly added.
    pub fn insert(&mut self, user_id: &str) -> bool {
        if self.contains(user_id) {
            return false;
        }
        self.user_ids.push(user_id.to_string());
        true
    }

    /// Returns true if the user was present.
    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.user_ids.len();
        self.user_ids.retain(|u| u != user_id);
        self.user_ids.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }
}

/// Wire shape of a reaction: carries `count` for readers, ignores it on load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionRecord {
    emoji: String,
    user_ids: Vec<String>,
    #[serde(default)]
    count: usize,
}

impl From<ReactionRecord> for Reaction {
    fn from(record: ReactionRecord) -> Self {
        let mut user_ids: Vec<String> = Vec::with_capacity(record.user_ids.len());
        for id in record.user_ids {
            if !user_ids.contains(&id) {
                user_ids.push(id);
            }
        }
        Self {
            emoji: record.emoji,
            user_ids,
        }
    }
}

impl From<Reaction> for ReactionRecord {
    fn from(reaction: Reaction) -> Self {
        let count = reaction.user_ids.len();
        Self {
            emoji: reaction.emoji,
            user_ids: reaction.user_ids,
            count,
        }
    }
}
