use whisper_types::{Message, Reaction};

/// What a toggle did to a user's reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionChange {
    Added,
    Removed,
}

/// Toggle `user_id`'s `emoji` reaction on a message.
///
/// Reactions keep the order in which each distinct emoji first appeared.
/// Removing the last user of an emoji drops that reaction entirely. Any
/// emoji string is accepted.
pub fn toggle_reaction(mut message: Message, emoji: &str, user_id: &str) -> Message {
    apply_toggle(&mut message, emoji, user_id);
    message
}

/// In-place form of [`toggle_reaction`] used by the store.
pub fn apply_toggle(message: &mut Message, emoji: &str, user_id: &str) -> ReactionChange {
    let Some(idx) = message.reactions.iter().position(|r| r.emoji == emoji) else {
        message.reactions.push(Reaction::new(emoji, user_id));
        return ReactionChange::Added;
    };

    let reaction = &mut message.reactions[idx];
    if reaction.remove(user_id) {
        if reaction.is_empty() {
            message.reactions.remove(idx);
        }
        ReactionChange::Removed
    } else {
        reaction.insert(user_id);
        ReactionChange::Added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_types::{Chat, ChatKind, ChatSettings, MessageMetadata, MessageType};

    fn message() -> Message {
        let chat = Chat::new(ChatKind::Private, Default::default(), ChatSettings::default());
        Message::new(&chat, "u1", "hello".into(), MessageType::Text, MessageMetadata::None)
    }

    #[test]
    fn thumbs_up_from_two_users_collapses() {
        let m = message();
        let m = toggle_reaction(m, "👍", "u2");
        let m = toggle_reaction(m, "👍", "u3");

        assert_eq!(m.reactions.len(), 1);
        let r = &m.reactions[0];
        assert_eq!(r.emoji, "👍");
        assert_eq!(r.user_ids(), ["u2".to_string(), "u3".to_string()]);
        assert_eq!(r.count(), 2);

        let m = toggle_reaction(m, "👍", "u2");
        let r = m.reaction("👍").unwrap();
        assert_eq!(r.user_ids(), ["u3".to_string()]);
        assert_eq!(r.count(), 1);
    }

    #[test]
    fn toggle_twice_restores_state() {
        let base = toggle_reaction(message(), "🔥", "u9");
        for (emoji, user) in [("🔥", "u9"), ("🔥", "u4"), ("❤️", "u4")] {
            let twice = toggle_reaction(toggle_reaction(base.clone(), emoji, user), emoji, user);
            assert_eq!(twice.reaction(emoji), base.reaction(emoji), "{emoji} by {user}");
        }
    }

    #[test]
    fn last_user_removal_drops_reaction() {
        let mut m = message();
        assert_eq!(apply_toggle(&mut m, "😂", "u2"), ReactionChange::Added);
        assert_eq!(apply_toggle(&mut m, "😂", "u2"), ReactionChange::Removed);
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn emoji_order_is_first_appearance() {
        let mut m = message();
        apply_toggle(&mut m, "a", "u1");
        apply_toggle(&mut m, "b", "u1");
        apply_toggle(&mut m, "c", "u1");
        apply_toggle(&mut m, "a", "u2");
        apply_toggle(&mut m, "b", "u1");
        apply_toggle(&mut m, "b", "u3");

        let order: Vec<&str> = m.reactions.iter().map(|r| r.emoji.as_str()).collect();
        assert_eq!(order, ["a", "c", "b"]);
    }
}
