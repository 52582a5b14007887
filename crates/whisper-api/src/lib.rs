pub mod chats;
pub mod contacts;
pub mod error;
pub mod events;
pub mod messages;
pub mod reactions;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use whisper_core::ChatStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: ChatStore,
}

/// All local API routes, including the `/events` WebSocket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/{chat_id}", get(chats::get_chat).delete(chats::delete_chat))
        .route("/chats/{chat_id}/settings", put(chats::update_settings))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}/read",
            post(messages::mark_read),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}/pin",
            put(messages::set_pinned),
        )
        .route("/chats/{chat_id}/pins", get(chats::pinned_messages))
        .route("/chats/{chat_id}/unread", get(chats::unread_count))
        .route(
            "/chats/{chat_id}/typing",
            get(chats::typing_user).post(chats::set_typing),
        )
        .route("/unread", get(chats::total_unread))
        .route(
            "/contacts",
            get(contacts::list_contacts).post(contacts::add_contact),
        )
        .route(
            "/contacts/{contact_id}",
            axum::routing::patch(contacts::update_contact).delete(contacts::remove_contact),
        )
        .route("/events", get(events::ws_upgrade))
        .with_state(state)
}
