use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::sleep;
use uuid::Uuid;

use whisper_core::{ChatError, ChatStore, StoreConfig};
use whisper_crypto::{AesGcmGateway, EncryptionGateway};
use whisper_db::{KvStore, MemoryStore};
use whisper_types::api::MessageBody;
use whisper_types::{
    Chat, ChatEvent, ChatKind, ChatSettings, Contact, DeleteReason, Message, MessageMetadata,
    MessageType, PresenceState,
};

struct FailingSeal;

impl EncryptionGateway for FailingSeal {
    fn seal(&self, _plaintext: &str) -> anyhow::Result<String> {
        anyhow::bail!("no key loaded")
    }

    fn open(&self, _ciphertext: &str) -> anyhow::Result<String> {
        anyhow::bail!("no key loaded")
    }
}

/// Memory store whose writes start failing once `broken` is set.
#[derive(Default)]
struct BreakableStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl KvStore for BreakableStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("read-only filesystem");
        }
        self.inner.put(key, value)
    }
}

fn config() -> StoreConfig {
    StoreConfig {
        user_id: "u1".into(),
        ..StoreConfig::default()
    }
}

fn open(kv: Arc<dyn KvStore>, gateway: Arc<dyn EncryptionGateway>) -> ChatStore {
    ChatStore::open(config(), kv, gateway, Handle::current())
}

/// Fresh store as `u1` with contacts `u2` and `u3`.
fn fresh() -> ChatStore {
    let store = open(Arc::new(MemoryStore::new()), Arc::new(AesGcmGateway::generate()));
    store.add_contact(Contact::new("u2", "Bob")).unwrap();
    store.add_contact(Contact::new("u3", "Carol")).unwrap();
    store
}

fn text(store: &ChatStore, chat_id: Uuid, content: &str) -> Message {
    store
        .send_message(chat_id, content, MessageType::Text, MessageMetadata::None)
        .unwrap()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    events
}

#[tokio::test(start_paused = true)]
async fn read_message_still_expires_on_time() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    assert_eq!(chat.settings.delete_timer_ms, 5000);

    let hi = text(&store, chat.id, "hi");
    let mut rx = store.subscribe();
    let messages = store.messages(chat.id).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].read);
    assert_eq!(store.open_message(chat.id, hi.id).unwrap(), "hi");

    assert!(store.mark_read_as("u2", chat.id, hi.id).unwrap());

    sleep(Duration::from_millis(4999)).await;
    assert_eq!(store.messages(chat.id).unwrap().len(), 1);
    assert!(store.messages(chat.id).unwrap()[0].read);

    sleep(Duration::from_millis(2)).await;
    assert!(store.messages(chat.id).unwrap().is_empty());
    assert_eq!(store.pending_deletes(), 0);

    // Deleting after expiry is a no-op.
    assert!(!store.delete_message(chat.id, hi.id).unwrap());
    let deletes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, ChatEvent::MessageDelete { .. }))
        .collect();
    assert_eq!(
        deletes,
        vec![ChatEvent::MessageDelete {
            chat_id: chat.id,
            message_id: hi.id,
            reason: DeleteReason::Expired,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn delete_at_the_deadline_applies_once() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let m = text(&store, chat.id, "race");
    let mut rx = store.subscribe();

    // Timer task and caller wake at the same instant; whichever takes the
    // lock second must find nothing to do.
    sleep(Duration::from_millis(5000)).await;
    let explicit = store.delete_message(chat.id, m.id).unwrap();
    sleep(Duration::from_millis(1000)).await;

    let reasons: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::MessageDelete { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    let expected = if explicit {
        DeleteReason::Explicit
    } else {
        DeleteReason::Expired
    };
    assert_eq!(reasons, vec![expected]);
    assert!(store.messages(chat.id).unwrap().is_empty());
    assert_eq!(store.pending_deletes(), 0);
}

#[tokio::test(start_paused = true)]
async fn each_message_has_its_own_timer() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let first = text(&store, chat.id, "first");
    sleep(Duration::from_millis(3000)).await;
    let second = text(&store, chat.id, "second");

    sleep(Duration::from_millis(2001)).await;
    let left: Vec<Uuid> = store.messages(chat.id).unwrap().iter().map(|m| m.id).collect();
    assert_eq!(left, vec![second.id]);
    assert!(!store.is_delete_scheduled(chat.id, first.id));

    sleep(Duration::from_millis(3000)).await;
    assert!(store.messages(chat.id).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn explicit_delete_cancels_timer() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let mut rx = store.subscribe();

    let m = text(&store, chat.id, "soon gone");
    assert!(store.is_delete_scheduled(chat.id, m.id));

    sleep(Duration::from_millis(1000)).await;
    assert!(store.delete_message(chat.id, m.id).unwrap());
    assert!(!store.is_delete_scheduled(chat.id, m.id));
    assert!(!store.delete_message(chat.id, m.id).unwrap());

    sleep(Duration::from_millis(10_000)).await;

    let deletes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::MessageDelete { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(deletes, vec![DeleteReason::Explicit]);
}

#[tokio::test(start_paused = true)]
async fn timer_publishes_expired_delete() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let m = text(&store, chat.id, "tick");
    let mut rx = store.subscribe();

    sleep(Duration::from_millis(5001)).await;

    assert_eq!(
        drain(&mut rx),
        vec![ChatEvent::MessageDelete {
            chat_id: chat.id,
            message_id: m.id,
            reason: DeleteReason::Expired,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn reactions_through_the_store() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let m = text(&store, chat.id, "lunch?");

    store.toggle_reaction(chat.id, m.id, "👍", "u2").unwrap();
    let m2 = store.toggle_reaction(chat.id, m.id, "👍", "u3").unwrap();
    assert_eq!(m2.reactions.len(), 1);
    assert_eq!(m2.reactions[0].count(), 2);
    assert_eq!(m2.reactions[0].user_ids(), ["u2".to_string(), "u3".to_string()]);

    let m3 = store.toggle_reaction(chat.id, m.id, "👍", "u2").unwrap();
    assert_eq!(m3.reactions[0].count(), 1);
    assert_eq!(m3.reactions[0].user_ids(), ["u3".to_string()]);

    let missing = Uuid::new_v4();
    assert_eq!(
        store.toggle_reaction(chat.id, missing, "👍", "u2").unwrap_err(),
        ChatError::MessageNotFound(missing)
    );
}

#[tokio::test]
async fn failed_seal_leaves_chat_untouched() {
    let store = open(Arc::new(MemoryStore::new()), Arc::new(FailingSeal));
    store.add_contact(Contact::new("u2", "Bob")).unwrap();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();

    let err = store
        .send_message(chat.id, "secret", MessageType::Text, MessageMetadata::None)
        .unwrap_err();
    assert!(matches!(err, ChatError::EncryptionFailed(_)));
    assert!(store.messages(chat.id).unwrap().is_empty());
    assert_eq!(store.pending_deletes(), 0);
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let m = store
        .send_message_as("u2", chat.id, "ping", MessageType::Text, MessageMetadata::None)
        .unwrap();
    assert_eq!(store.unread_count(chat.id).unwrap(), 1);
    assert_eq!(store.total_unread(), 1);

    assert!(store.mark_read(chat.id, m.id).unwrap());
    let once = store.messages(chat.id).unwrap();
    assert!(!store.mark_read(chat.id, m.id).unwrap());
    assert_eq!(store.messages(chat.id).unwrap(), once);
    assert_eq!(store.unread_count(chat.id).unwrap(), 0);

    // Vanished message is a no-op, vanished chat is an error.
    assert!(!store.mark_read(chat.id, Uuid::new_v4()).unwrap());
    let ghost = Uuid::new_v4();
    assert_eq!(store.mark_read(ghost, m.id).unwrap_err(), ChatError::ChatNotFound(ghost));
}

#[tokio::test]
async fn pinned_view_follows_messages() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let ids: Vec<Uuid> = (0..4).map(|i| text(&store, chat.id, &format!("m{i}")).id).collect();

    store.set_pinned(chat.id, ids[2], true).unwrap();
    store.set_pinned(chat.id, ids[0], true).unwrap();
    store.set_pinned(chat.id, ids[3], true).unwrap();
    store.set_pinned(chat.id, ids[3], false).unwrap();
    store.delete_message(chat.id, ids[2]).unwrap();

    let pinned: Vec<Uuid> = store.pinned_messages(chat.id).unwrap().iter().map(|m| m.id).collect();
    let filtered: Vec<Uuid> = store
        .messages(chat.id)
        .unwrap()
        .iter()
        .filter(|m| m.is_pinned)
        .map(|m| m.id)
        .collect();
    assert_eq!(pinned, vec![ids[0]]);
    assert_eq!(pinned, filtered);
}

#[tokio::test]
async fn settings_change_is_not_retroactive() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let before = text(&store, chat.id, "old policy");

    store
        .update_settings(
            chat.id,
            ChatSettings {
                auto_delete: false,
                delete_timer_ms: 60_000,
                encryption_enabled: false,
                muted: true,
            },
        )
        .unwrap();
    let after = text(&store, chat.id, "new policy");

    assert!(before.auto_delete && before.encrypted);
    assert_eq!(before.delete_timer_ms, 5000);
    assert!(!after.auto_delete && !after.encrypted);
    assert_eq!(after.content, "new policy");
    assert!(store.is_delete_scheduled(chat.id, before.id));
    assert!(!store.is_delete_scheduled(chat.id, after.id));
}

#[tokio::test]
async fn private_chats_are_deduplicated() {
    let store = fresh();
    let a = store.create_chat("u2", ChatKind::Private).unwrap();
    let b = store.create_chat("u2", ChatKind::Private).unwrap();
    let c = store.create_chat("u2", ChatKind::Channel).unwrap();
    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_eq!(store.chats().len(), 2);

    assert_eq!(
        store.create_chat("stranger", ChatKind::Private).unwrap_err(),
        ChatError::InvalidParticipant("stranger".into())
    );
    store.set_blocked("u3", true).unwrap();
    assert!(store.create_chat("u3", ChatKind::Private).is_err());
}

#[tokio::test]
async fn sender_must_be_a_participant() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    let err = store
        .send_message_as("u3", chat.id, "hey", MessageType::Text, MessageMetadata::None)
        .unwrap_err();
    assert_eq!(err, ChatError::InvalidParticipant("u3".into()));

    let ghost = Uuid::new_v4();
    assert_eq!(
        store.send_message(ghost, "x", MessageType::Text, MessageMetadata::None).unwrap_err(),
        ChatError::ChatNotFound(ghost)
    );
}

#[tokio::test(start_paused = true)]
async fn typing_clears_after_window_or_on_send() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();

    store.set_typing(chat.id, "u2", true).unwrap();
    sleep(Duration::from_millis(2999)).await;
    assert_eq!(store.typing_user(chat.id).as_deref(), Some("u2"));
    sleep(Duration::from_millis(2)).await;
    assert!(!store.is_typing(chat.id));

    store.set_typing(chat.id, "u2", true).unwrap();
    store
        .send_message_as("u2", chat.id, "done", MessageType::Text, MessageMetadata::None)
        .unwrap();
    assert!(!store.is_typing(chat.id));
}

#[tokio::test(start_paused = true)]
async fn reopen_restores_messages_and_timers() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn EncryptionGateway> = Arc::new(AesGcmGateway::generate());

    let first = open(kv.clone(), gateway.clone());
    first.add_contact(Contact::new("u2", "Bob")).unwrap();
    let chat = first.create_chat("u2", ChatKind::Private).unwrap();
    let m = text(&first, chat.id, "persist me");
    first.toggle_reaction(chat.id, m.id, "🔥", "u2").unwrap();
    drop(first);

    let second = open(kv, gateway);
    assert_eq!(second.contacts().len(), 1);
    let messages = second.messages(chat.id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].reactions[0].count(), 1);
    assert_eq!(second.open_message(chat.id, m.id).unwrap(), "persist me");
    assert!(second.is_delete_scheduled(chat.id, m.id));
    assert!(second.delete_due_in(chat.id, m.id).unwrap() <= Duration::from_millis(5000));

    sleep(Duration::from_millis(5001)).await;
    assert!(second.messages(chat.id).unwrap().is_empty());
}

#[tokio::test]
async fn expired_messages_are_purged_on_open() {
    let kv = Arc::new(MemoryStore::new());
    let settings = ChatSettings {
        encryption_enabled: false,
        ..ChatSettings::default()
    };
    let mut chat = Chat::new(
        ChatKind::Private,
        ["u1".to_string(), "u2".to_string()].into_iter().collect(),
        settings,
    );
    let mut stale = Message::new(&chat, "u2", "old".into(), MessageType::Text, MessageMetadata::None);
    stale.timestamp = Utc::now() - chrono::Duration::hours(1);
    let mut kept = Message::new(&chat, "u2", "kept".into(), MessageType::Text, MessageMetadata::None);
    kept.auto_delete = false;
    chat.messages = vec![stale, kept];
    kv.put("chats", &serde_json::to_string(&vec![chat.clone()]).unwrap())
        .unwrap();

    let store = open(kv.clone(), Arc::new(AesGcmGateway::generate()));
    let contents: Vec<String> = store
        .messages(chat.id)
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, ["kept"]);
    assert_eq!(store.pending_deletes(), 0);

    let saved: Vec<Chat> = serde_json::from_str(&kv.get("chats").unwrap().unwrap()).unwrap();
    assert_eq!(saved[0].messages.len(), 1);
}

#[tokio::test]
async fn corrupt_storage_starts_empty() {
    let kv = Arc::new(MemoryStore::new());
    kv.put("chats", "[{\"id\": 42").unwrap();
    kv.put("contacts", "not json at all").unwrap();

    let store = open(kv, Arc::new(AesGcmGateway::generate()));
    assert!(store.chats().is_empty());
    assert!(store.contacts().is_empty());
}

#[tokio::test]
async fn undecryptable_message_renders_unreadable() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let first = open(kv.clone(), Arc::new(AesGcmGateway::generate()));
    first.add_contact(Contact::new("u2", "Bob")).unwrap();
    let chat = first.create_chat("u2", ChatKind::Private).unwrap();
    let sealed = text(&first, chat.id, "for the old key");
    drop(first);

    // Different key: the sealed message can no longer be opened.
    let second = open(kv, Arc::new(AesGcmGateway::generate()));
    second
        .update_settings(
            chat.id,
            ChatSettings {
                encryption_enabled: false,
                ..ChatSettings::default()
            },
        )
        .unwrap();
    let plain = text(&second, chat.id, "in the clear");

    let views = second.display_messages(chat.id).unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].body, MessageBody::Unreadable);
    assert_eq!(views[1].body, MessageBody::Readable("in the clear".into()));
    assert_eq!(views[1].message.id, plain.id);

    assert!(matches!(
        second.open_message(chat.id, sealed.id).unwrap_err(),
        ChatError::DecryptionFailed { message_id, .. } if message_id == sealed.id
    ));
}

#[tokio::test]
async fn write_failure_keeps_the_change_in_memory() {
    let kv = Arc::new(BreakableStore::default());
    let store = open(kv.clone(), Arc::new(AesGcmGateway::generate()));
    store.add_contact(Contact::new("u2", "Bob")).unwrap();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();

    kv.broken.store(true, Ordering::SeqCst);
    let err = store
        .send_message(chat.id, "unsaved", MessageType::Text, MessageMetadata::None)
        .unwrap_err();
    assert!(matches!(err, ChatError::PersistenceWriteFailed { key: "chats", .. }));
    assert_eq!(store.messages(chat.id).unwrap().len(), 1);

    let saved: Vec<Chat> = serde_json::from_str(&kv.get("chats").unwrap().unwrap()).unwrap();
    assert!(saved[0].messages.is_empty());
}

#[tokio::test]
async fn contact_operations_publish_updates() {
    let store = fresh();
    let mut rx = store.subscribe();

    assert!(store.set_favorite("u2", true).unwrap().is_favorite);
    assert_eq!(
        store.set_favorite("ghost", true).unwrap_err(),
        ChatError::ContactNotFound("ghost".into())
    );
    let hits: Vec<String> = store.search_contacts("car").into_iter().map(|c| c.id).collect();
    assert_eq!(hits, ["u3"]);
    assert!(store.remove_contact("u3").unwrap());
    assert!(!store.remove_contact("u3").unwrap());
    assert!(store.contact("u3").is_none());

    assert_eq!(
        store.set_presence("u2", PresenceState::Online).unwrap().presence_state,
        PresenceState::Online
    );

    assert_eq!(drain(&mut rx), vec![ChatEvent::ContactsUpdate; 3]);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_chat_cancels_its_timers() {
    let store = fresh();
    let chat = store.create_chat("u2", ChatKind::Private).unwrap();
    text(&store, chat.id, "a");
    text(&store, chat.id, "b");
    assert_eq!(store.pending_deletes(), 2);

    assert!(store.delete_chat(chat.id).unwrap());
    assert_eq!(store.pending_deletes(), 0);
    assert!(!store.delete_chat(chat.id).unwrap());
    assert_eq!(store.chat(chat.id).unwrap_err(), ChatError::ChatNotFound(chat.id));
}
