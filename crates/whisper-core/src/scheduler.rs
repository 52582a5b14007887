use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::timers::Timers;

/// Identifies one ephemeral message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeleteKey {
    pub chat_id: Uuid,
    pub message_id: Uuid,
}

/// One cancellable auto-delete timer per message.
///
/// The scheduler only knows `(chat_id, message_id, deadline)`. It never
/// touches a message: when a deadline passes, the `on_fire` callback given
/// to [`schedule`](DeleteScheduler::schedule) is expected to re-enter the
/// chat store, which then calls [`claim`](DeleteScheduler::claim) under its
/// lock before deleting.
pub struct DeleteScheduler {
    timers: Timers<DeleteKey>,
}

impl DeleteScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            timers: Timers::new(runtime),
        }
    }

    /// Register (or replace) the delete timer for a message.
    pub fn schedule<F>(&mut self, key: DeleteKey, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(DeleteKey, u64) + Send + 'static,
    {
        debug!(
            chat_id = %key.chat_id,
            message_id = %key.message_id,
            delay_ms = delay.as_millis() as u64,
            "auto-delete scheduled"
        );
        self.timers.arm(key, delay, on_fire)
    }

    /// Called from the fire path. True means this fire owns the delete.
    pub fn claim(&mut self, key: &DeleteKey, generation: u64) -> bool {
        self.timers.claim(key, generation)
    }

    /// Cancel the pending timer for a message. Cancelling after the timer
    /// fired, or for a message that never had one, is a no-op.
    pub fn cancel(&mut self, key: &DeleteKey) -> bool {
        let cancelled = self.timers.disarm(key);
        if cancelled {
            debug!(chat_id = %key.chat_id, message_id = %key.message_id, "auto-delete cancelled");
        }
        cancelled
    }

    /// Cancel every pending timer of a chat.
    pub fn cancel_chat(&mut self, chat_id: Uuid) -> usize {
        self.timers.disarm_where(|k| k.chat_id == chat_id)
    }

    pub fn is_scheduled(&self, key: &DeleteKey) -> bool {
        self.timers.is_armed(key)
    }

    pub fn deadline(&self, key: &DeleteKey) -> Option<Instant> {
        self.timers.deadline(key)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}
