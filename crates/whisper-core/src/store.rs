use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use whisper_crypto::EncryptionGateway;
use whisper_db::{CHATS_KEY, CONTACTS_KEY, KvStore};
use whisper_types::api::{MessageBody, MessageView};
use whisper_types::{
    Chat, ChatEvent, ChatKind, ChatSettings, Contact, DeleteReason, Message, MessageMetadata,
    MessageType, PresenceState,
};

use crate::config::StoreConfig;
use crate::contacts::{ContactBook, ContactPatch};
use crate::error::{ChatError, Result};
use crate::persist::{load_or_empty, save_collection};
use crate::reactions::{ReactionChange, apply_toggle};
use crate::scheduler::{DeleteKey, DeleteScheduler};
use crate::typing::TypingTracker;
use crate::{pins, receipts};

/// Owner of all chats, messages and contacts of the local user.
///
/// Every command takes the same lock, applies its change to the whole
/// aggregate, publishes a [`ChatEvent`] and writes the full collection back
/// to the [`KvStore`] before returning. Auto-delete and typing-expiry timers
/// run as separate tasks that re-enter through that lock like any other
/// command, so a timer firing and a caller deleting the same message can
/// never both apply.
///
/// Cloning is cheap and every clone refers to the same store.
#[derive(Clone)]
pub struct ChatStore {
    shared: Arc<Shared>,
}

struct Shared {
    config: StoreConfig,
    kv: Arc<dyn KvStore>,
    gateway: Arc<dyn EncryptionGateway>,
    events: broadcast::Sender<ChatEvent>,
    state: Mutex<State>,
}

struct State {
    chats: Vec<Chat>,
    contacts: ContactBook,
    deletes: DeleteScheduler,
    typing: TypingTracker,
}

impl State {
    fn chat(&self, chat_id: Uuid) -> Result<&Chat> {
        self.chats
            .iter()
            .find(|c| c.id == chat_id)
            .ok_or(ChatError::ChatNotFound(chat_id))
    }

    fn chat_mut(&mut self, chat_id: Uuid) -> Result<&mut Chat> {
        self.chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or(ChatError::ChatNotFound(chat_id))
    }
}

impl ChatStore {
    /// Load chats and contacts from `kv` and re-arm timers for persisted
    /// ephemeral messages. Unreadable stored data is logged and replaced by
    /// an empty collection; opening never fails.
    ///
    /// Timer tasks are spawned on `runtime`.
    pub fn open(
        config: StoreConfig,
        kv: Arc<dyn KvStore>,
        gateway: Arc<dyn EncryptionGateway>,
        runtime: Handle,
    ) -> Self {
        let chats: Vec<Chat> = load_or_empty(kv.as_ref(), CHATS_KEY);
        let contacts: Vec<Contact> = load_or_empty(kv.as_ref(), CONTACTS_KEY);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let state = State {
            chats,
            contacts: ContactBook::new(contacts),
            deletes: DeleteScheduler::new(runtime.clone()),
            typing: TypingTracker::new(runtime, config.typing_window),
        };

        let store = Self {
            shared: Arc::new(Shared {
                config,
                kv,
                gateway,
                events,
                state: Mutex::new(state),
            }),
        };
        store.restore_timers();
        store
    }

    pub fn user_id(&self) -> &str {
        &self.shared.config.user_id
    }

    /// Change notifications for every applied mutation, including timer
    /// driven deletes and typing expiry.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    // ==================== Chats ====================

    /// Open a chat with a contact. A private chat with the same participants
    /// is returned as-is instead of creating a second one.
    pub fn create_chat(&self, participant_id: &str, kind: ChatKind) -> Result<Chat> {
        let mut state = self.lock();
        state.contacts.reachable(participant_id)?;

        let participants: BTreeSet<String> = [self.user_id().to_string(), participant_id.to_string()]
            .into_iter()
            .collect();

        if kind == ChatKind::Private {
            if let Some(existing) = state
                .chats
                .iter()
                .find(|c| c.kind == ChatKind::Private && c.participant_ids == participants)
            {
                return Ok(existing.clone());
            }
        }

        let chat = Chat::new(kind, participants, self.shared.config.default_settings);
        state.chats.push(chat.clone());
        info!(chat_id = %chat.id, ?kind, participant = participant_id, "chat created");

        self.emit(ChatEvent::ChatCreated { chat_id: chat.id });
        self.persist_chats(&state)?;
        Ok(chat)
    }

    /// Replace a chat's settings. Messages already sent keep the delete
    /// policy they were sent with.
    pub fn update_settings(&self, chat_id: Uuid, settings: ChatSettings) -> Result<Chat> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id)?;
        chat.settings = settings;
        let updated = chat.clone();

        self.emit(ChatEvent::SettingsUpdated { chat_id });
        self.persist_chats(&state)?;
        Ok(updated)
    }

    /// Remove a chat with all its messages and timers. Returns false if the
    /// chat did not exist.
    pub fn delete_chat(&self, chat_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let Some(idx) = state.chats.iter().position(|c| c.id == chat_id) else {
            return Ok(false);
        };
        state.chats.remove(idx);
        let cancelled = state.deletes.cancel_chat(chat_id);
        state.typing.stop(chat_id);
        info!(chat_id = %chat_id, cancelled_timers = cancelled, "chat deleted");

        self.emit(ChatEvent::ChatDeleted { chat_id });
        self.persist_chats(&state)?;
        Ok(true)
    }

    pub fn chat(&self, chat_id: Uuid) -> Result<Chat> {
        self.lock().chat(chat_id).cloned()
    }

    /// All chats, most recently active first.
    pub fn chats(&self) -> Vec<Chat> {
        let mut chats = self.lock().chats.clone();
        chats.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        chats
    }

    // ==================== Messages ====================

    /// Send a message as the local user.
    pub fn send_message(
        &self,
        chat_id: Uuid,
        content: impl Into<String>,
        kind: MessageType,
        metadata: MessageMetadata,
    ) -> Result<Message> {
        let sender = self.user_id().to_string();
        self.send_message_as(&sender, chat_id, content, kind, metadata)
    }

    /// Append a message from any participant of the chat.
    ///
    /// The message takes the chat's current delete policy and, if the chat
    /// is encrypted, is sealed before it is stored. A sealing failure leaves
    /// the chat untouched.
    pub fn send_message_as(
        &self,
        sender_id: &str,
        chat_id: Uuid,
        content: impl Into<String>,
        kind: MessageType,
        metadata: MessageMetadata,
    ) -> Result<Message> {
        let mut state = self.lock();
        let chat = state.chat(chat_id)?;
        if !chat.has_participant(sender_id) {
            return Err(ChatError::InvalidParticipant(sender_id.to_string()));
        }

        let mut message = Message::new(chat, sender_id, content.into(), kind, metadata);
        if message.encrypted {
            message.content = self.shared.gateway.seal(&message.content).map_err(|e| {
                warn!(chat_id = %chat_id, "sealing failed, message dropped: {}", e);
                ChatError::EncryptionFailed(e.to_string())
            })?;
        }

        state.chat_mut(chat_id)?.push_message(message.clone());

        if message.auto_delete {
            let key = DeleteKey {
                chat_id,
                message_id: message.id,
            };
            self.schedule_delete(&mut state, key, Duration::from_millis(message.delete_timer_ms));
        }

        // Sending ends the sender's typing indicator.
        if state.typing.typing_user(chat_id) == Some(sender_id) && state.typing.stop(chat_id) {
            self.emit(ChatEvent::TypingUpdate {
                chat_id,
                user_id: None,
            });
        }

        debug!(chat_id = %chat_id, message_id = %message.id, kind = ?message.kind, "message sent");
        self.emit(ChatEvent::MessageCreate {
            chat_id,
            message_id: message.id,
            sender_id: message.sender_id.clone(),
        });
        self.persist_chats(&state)?;
        Ok(message)
    }

    /// Remove a message and cancel its auto-delete timer. Deleting a message
    /// that is already gone (or whose chat is gone) is a no-op returning
    /// false.
    pub fn delete_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        state.deletes.cancel(&DeleteKey { chat_id, message_id });

        let removed = state
            .chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .and_then(|chat| chat.remove_message(message_id))
            .is_some();
        if !removed {
            return Ok(false);
        }

        debug!(chat_id = %chat_id, message_id = %message_id, "message deleted");
        self.emit(ChatEvent::MessageDelete {
            chat_id,
            message_id,
            reason: DeleteReason::Explicit,
        });
        self.persist_chats(&state)?;
        Ok(true)
    }

    /// Mark an inbound message read by the local user.
    pub fn mark_read(&self, chat_id: Uuid, message_id: Uuid) -> Result<bool> {
        let reader = self.user_id().to_string();
        self.mark_read_as(&reader, chat_id, message_id)
    }

    /// Returns true only for the call that flipped the message to read.
    /// Already-read, own and vanished messages are left alone.
    pub fn mark_read_as(&self, reader_id: &str, chat_id: Uuid, message_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id)?;
        let Some(message) = chat.message_mut(message_id) else {
            return Ok(false);
        };
        if !receipts::mark_read(message, reader_id) {
            return Ok(false);
        }
        chat.touch();

        self.emit(ChatEvent::MessageRead {
            chat_id,
            message_id,
            reader_id: reader_id.to_string(),
        });
        self.persist_chats(&state)?;
        Ok(true)
    }

    pub fn toggle_reaction(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        emoji: &str,
        user_id: &str,
    ) -> Result<Message> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id)?;
        let message = chat
            .message_mut(message_id)
            .ok_or(ChatError::MessageNotFound(message_id))?;
        let change = apply_toggle(message, emoji, user_id);
        let updated = message.clone();
        chat.touch();

        let (user_id, emoji) = (user_id.to_string(), emoji.to_string());
        self.emit(match change {
            ReactionChange::Added => ChatEvent::ReactionAdd {
                chat_id,
                message_id,
                user_id,
                emoji,
            },
            ReactionChange::Removed => ChatEvent::ReactionRemove {
                chat_id,
                message_id,
                user_id,
                emoji,
            },
        });
        self.persist_chats(&state)?;
        Ok(updated)
    }

    pub fn set_pinned(&self, chat_id: Uuid, message_id: Uuid, pinned: bool) -> Result<Message> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id)?;
        let message = chat
            .message_mut(message_id)
            .ok_or(ChatError::MessageNotFound(message_id))?;
        if !pins::apply_pin(message, pinned) {
            return Ok(message.clone());
        }
        let updated = message.clone();
        chat.touch();

        self.emit(ChatEvent::PinUpdate {
            chat_id,
            message_id,
            pinned,
        });
        self.persist_chats(&state)?;
        Ok(updated)
    }

    pub fn messages(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.lock().chat(chat_id)?.messages.clone())
    }

    /// Plaintext of one message.
    pub fn open_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<String> {
        let message = {
            let state = self.lock();
            state
                .chat(chat_id)?
                .message(message_id)
                .cloned()
                .ok_or(ChatError::MessageNotFound(message_id))?
        };
        self.unseal(&message)
    }

    /// Every message of a chat with its plaintext. A message that cannot be
    /// opened is marked unreadable; the others are unaffected.
    pub fn display_messages(&self, chat_id: Uuid) -> Result<Vec<MessageView>> {
        let messages = self.messages(chat_id)?;
        Ok(messages
            .into_iter()
            .map(|message| {
                let body = match self.unseal(&message) {
                    Ok(text) => MessageBody::Readable(text),
                    Err(e) => {
                        warn!("{}", e);
                        MessageBody::Unreadable
                    }
                };
                MessageView { message, body }
            })
            .collect())
    }

    // ==================== Derived views ====================

    /// Unread inbound messages for the local user.
    pub fn unread_count(&self, chat_id: Uuid) -> Result<usize> {
        let state = self.lock();
        Ok(receipts::unread_count(state.chat(chat_id)?, self.user_id()))
    }

    pub fn total_unread(&self) -> usize {
        let state = self.lock();
        receipts::total_unread(&state.chats, self.user_id())
    }

    pub fn pinned_messages(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let state = self.lock();
        Ok(pins::pinned_messages(state.chat(chat_id)?)
            .into_iter()
            .cloned()
            .collect())
    }

    // ==================== Typing ====================

    /// Show or clear `user_id` as the typer of a chat. The indicator clears
    /// itself after the configured window unless refreshed.
    pub fn set_typing(&self, chat_id: Uuid, user_id: &str, is_typing: bool) -> Result<()> {
        let mut state = self.lock();
        state.chat(chat_id)?;

        if is_typing {
            let weak = Arc::downgrade(&self.shared);
            let changed = state.typing.start(chat_id, user_id, move |chat_id, generation| {
                if let Some(shared) = weak.upgrade() {
                    ChatStore { shared }.expire_typing(chat_id, generation);
                }
            });
            if changed {
                self.emit(ChatEvent::TypingUpdate {
                    chat_id,
                    user_id: Some(user_id.to_string()),
                });
            }
        } else if state.typing.stop(chat_id) {
            self.emit(ChatEvent::TypingUpdate {
                chat_id,
                user_id: None,
            });
        }
        Ok(())
    }

    pub fn typing_user(&self, chat_id: Uuid) -> Option<String> {
        self.lock().typing.typing_user(chat_id).map(str::to_string)
    }

    pub fn is_typing(&self, chat_id: Uuid) -> bool {
        self.lock().typing.typing_user(chat_id).is_some()
    }

    // ==================== Contacts ====================

    pub fn add_contact(&self, contact: Contact) -> Result<Contact> {
        self.mutate_contacts(|book| book.add(contact))
    }

    pub fn update_contact(&self, contact: Contact) -> Result<Contact> {
        self.mutate_contacts(|book| book.update(contact))
    }

    /// Change several fields of one contact as a single update: one write,
    /// one event, and no change at all if any field is rejected.
    pub fn patch_contact(&self, contact_id: &str, patch: ContactPatch) -> Result<Contact> {
        self.mutate_contacts(|book| book.patch(contact_id, patch))
    }

    /// Chats with the contact are kept. Returns false if it was unknown.
    pub fn remove_contact(&self, contact_id: &str) -> Result<bool> {
        self.mutate_contacts(|book| {
            book.remove(contact_id)
                .map(|_| true)
                .ok_or_else(|| ChatError::ContactNotFound(contact_id.to_string()))
        })
        .or_else(|e| match e {
            ChatError::ContactNotFound(_) => Ok(false),
            other => Err(other),
        })
    }

    pub fn set_favorite(&self, contact_id: &str, favorite: bool) -> Result<Contact> {
        self.mutate_contacts(|book| book.set_favorite(contact_id, favorite))
    }

    pub fn set_blocked(&self, contact_id: &str, blocked: bool) -> Result<Contact> {
        self.mutate_contacts(|book| book.set_blocked(contact_id, blocked))
    }

    pub fn set_presence(&self, contact_id: &str, presence: PresenceState) -> Result<Contact> {
        self.mutate_contacts(|book| book.set_presence(contact_id, presence))
    }

    pub fn contact(&self, contact_id: &str) -> Option<Contact> {
        self.lock().contacts.get(contact_id).cloned()
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.lock().contacts.all().to_vec()
    }

    pub fn search_contacts(&self, query: &str) -> Vec<Contact> {
        self.lock().contacts.search(query).into_iter().cloned().collect()
    }

    // ==================== Timers ====================

    pub fn pending_deletes(&self) -> usize {
        self.lock().deletes.pending()
    }

    pub fn is_delete_scheduled(&self, chat_id: Uuid, message_id: Uuid) -> bool {
        self.lock().deletes.is_scheduled(&DeleteKey { chat_id, message_id })
    }

    /// Time left before a message's auto-delete fires, if one is pending.
    pub fn delete_due_in(&self, chat_id: Uuid, message_id: Uuid) -> Option<Duration> {
        let deadline = self.lock().deletes.deadline(&DeleteKey { chat_id, message_id })?;
        Some(deadline.saturating_duration_since(tokio::time::Instant::now()))
    }

    fn schedule_delete(&self, state: &mut State, key: DeleteKey, delay: Duration) {
        let weak = Arc::downgrade(&self.shared);
        state.deletes.schedule(key, delay, move |key, generation| {
            if let Some(shared) = weak.upgrade() {
                ChatStore { shared }.expire_message(key, generation);
            }
        });
    }

    /// Fire path of an auto-delete timer.
    fn expire_message(&self, key: DeleteKey, generation: u64) {
        let mut state = self.lock();
        if !state.deletes.claim(&key, generation) {
            debug!(message_id = %key.message_id, "stale auto-delete ignored");
            return;
        }
        let removed = match state.chat_mut(key.chat_id) {
            Ok(chat) => chat.remove_message(key.message_id).is_some(),
            Err(_) => false,
        };
        if !removed {
            return;
        }

        debug!(chat_id = %key.chat_id, message_id = %key.message_id, "message expired");
        self.emit(ChatEvent::MessageDelete {
            chat_id: key.chat_id,
            message_id: key.message_id,
            reason: DeleteReason::Expired,
        });
        // Already logged; nobody to surface it to.
        let _ = self.persist_chats(&state);
    }

    fn expire_typing(&self, chat_id: Uuid, generation: u64) {
        let mut state = self.lock();
        if state.typing.expire(chat_id, generation) {
            self.emit(ChatEvent::TypingUpdate {
                chat_id,
                user_id: None,
            });
        }
    }

    /// Purge persisted ephemeral messages whose deadline passed while the
    /// store was closed, and re-arm timers for the rest.
    fn restore_timers(&self) {
        let mut state = self.lock();
        let now = Utc::now();
        let mut purged = 0usize;
        let mut rearm = Vec::new();

        for chat in &mut state.chats {
            let before = chat.messages.len();
            chat.messages
                .retain(|m| m.expires_at().is_none_or(|deadline| deadline > now));
            purged += before - chat.messages.len();

            for m in &chat.messages {
                if let Some(deadline) = m.expires_at() {
                    let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                    rearm.push((
                        DeleteKey {
                            chat_id: chat.id,
                            message_id: m.id,
                        },
                        remaining,
                    ));
                }
            }
        }

        for (key, remaining) in rearm.iter().copied() {
            self.schedule_delete(&mut state, key, remaining);
        }

        info!(
            chats = state.chats.len(),
            contacts = state.contacts.all().len(),
            purged,
            rearmed = rearm.len(),
            "chat store loaded"
        );
        if purged > 0 {
            let _ = self.persist_chats(&state);
        }
    }

    // ==================== Internals ====================

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    fn unseal(&self, message: &Message) -> Result<String> {
        if !message.encrypted {
            return Ok(message.content.clone());
        }
        self.shared
            .gateway
            .open(&message.content)
            .map_err(|e| ChatError::DecryptionFailed {
                message_id: message.id,
                reason: e.to_string(),
            })
    }

    fn persist_chats(&self, state: &State) -> Result<()> {
        save_collection(self.shared.kv.as_ref(), CHATS_KEY, &state.chats)
    }

    fn mutate_contacts<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ContactBook) -> Result<T>,
    {
        let mut state = self.lock();
        let out = f(&mut state.contacts)?;
        self.emit(ChatEvent::ContactsUpdate);
        save_collection(self.shared.kv.as_ref(), CONTACTS_KEY, state.contacts.all())?;
        Ok(out)
    }
}
