use whisper_types::{Chat, Message};

pub fn set_pinned(mut message: Message, pinned: bool) -> Message {
    apply_pin(&mut message, pinned);
    message
}

/// In-place variant. Returns true if the flag changed.
pub fn apply_pin(message: &mut Message, pinned: bool) -> bool {
    if message.is_pinned == pinned {
        return false;
    }
    message.is_pinned = pinned;
    true
}

/// Pinned messages of a chat in display order. Always derived from the
/// message sequence, so deleting a pinned message unpins it implicitly.
pub fn pinned_messages(chat: &Chat) -> Vec<&Message> {
    chat.messages.iter().filter(|m| m.is_pinned).collect()
}
