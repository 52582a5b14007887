use whisper_types::{Chat, Message};

/// Flip an inbound message to read. Returns true only on the first read;
/// reading twice, or reading one's own message, changes nothing.
pub fn mark_read(message: &mut Message, reader_id: &str) -> bool {
    if message.read || message.sender_id == reader_id {
        return false;
    }
    message.read = true;
    true
}

/// Unread inbound messages in a chat, computed from the messages themselves.
pub fn unread_count(chat: &Chat, self_id: &str) -> usize {
    chat.messages
        .iter()
        .filter(|m| !m.read && m.sender_id != self_id)
        .count()
}

pub fn total_unread<'a>(chats: impl IntoIterator<Item = &'a Chat>, self_id: &str) -> usize {
    chats.into_iter().map(|c| unread_count(c, self_id)).sum()
}
