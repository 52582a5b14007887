use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;

use whisper_types::ChatEvent;
use whisper_types::api::EventsQuery;

use crate::AppState;

/// Server sends a Ping this often; two unanswered Pings drop the socket.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Subscribe before the upgrade so nothing published in between is lost.
    let events = state.store.subscribe();
    ws.on_upgrade(move |socket| handle_connection(socket, events, query.chat_id))
}

/// Should `event` reach a client watching `filter`?
fn wanted(event: &ChatEvent, filter: Option<Uuid>) -> bool {
    match (filter, event.chat_id()) {
        (Some(wanted), Some(chat_id)) => wanted == chat_id,
        _ => true,
    }
}

/// Forward store events to one client as JSON text frames. Incoming frames
/// are only read for Pongs and Close.
async fn handle_connection(
    socket: WebSocket,
    mut events: broadcast::Receiver<ChatEvent>,
    filter: Option<Uuid>,
) {
    let (mut sender, mut receiver) = socket.split();
    info!(?filter, "event stream connected");

    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Event stream lagged by {} events", n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !wanted(&event, filter) {
                        continue;
                    }
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(()) = pong_rx.recv() => {
                    missed_heartbeats = 0;
                }
                _ = heartbeat.tick() => {
                    missed_heartbeats += 1;
                    if missed_heartbeats > 2 {
                        warn!("Heartbeat timeout, dropping event stream");
                        break;
                    }
                    if sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either side ending closes the connection
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(?filter, "event stream disconnected");
}
