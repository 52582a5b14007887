use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use uuid::Uuid;

use crate::timers::Timers;

/// Default lifetime of a typing indicator.
pub const DEFAULT_TYPING_WINDOW: Duration = Duration::from_millis(3000);

/// Who is typing in each chat. One active typer per chat: a second user's
/// call replaces the first. Not persisted.
pub struct TypingTracker {
    active: HashMap<Uuid, String>,
    expiry: Timers<Uuid>,
    window: Duration,
}

impl TypingTracker {
    pub fn new(runtime: Handle, window: Duration) -> Self {
        Self {
            active: HashMap::new(),
            expiry: Timers::new(runtime),
            window,
        }
    }

    /// Record `user_id` as typing in `chat_id` and restart the expiry window.
    /// `on_expire` is called when the window lapses and must come back
    /// through [`expire`](TypingTracker::expire). Returns true if the visible
    /// typer changed.
    pub fn start<F>(&mut self, chat_id: Uuid, user_id: &str, on_expire: F) -> bool
    where
        F: FnOnce(Uuid, u64) + Send + 'static,
    {
        self.expiry.arm(chat_id, self.window, on_expire);
        match self.active.insert(chat_id, user_id.to_string()) {
            Some(previous) => previous != user_id,
            None => true,
        }
    }

    /// Clear the typer immediately. Returns true if someone was typing.
    pub fn stop(&mut self, chat_id: Uuid) -> bool {
        self.expiry.disarm(&chat_id);
        self.active.remove(&chat_id).is_some()
    }

    /// Expiry path. Only the latest window for the chat may clear it.
    pub fn expire(&mut self, chat_id: Uuid, generation: u64) -> bool {
        if !self.expiry.claim(&chat_id, generation) {
            return false;
        }
        self.active.remove(&chat_id).is_some()
    }

    pub fn typing_user(&self, chat_id: Uuid) -> Option<&str> {
        self.active.get(&chat_id).map(String::as_str)
    }
}
