//! axum WebSocket relay front-end (spec.md §6/§7).
//!
//! One task per connection. Accepted events fan out to live subscribers
//! via a `tokio::sync::broadcast` channel, the same `Router` /
//! `WebSocketUpgrade` / `ws.on_upgrade` shape as the teacher's `web.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;

use crate::config::RelayConfig;
use crate::event::Event;
use crate::relay::dispatch;
use crate::relay::protocol::{ClientMessage, RelayMessage};
use crate::store::{EventStore, Filter};

const BROADCAST_CAPACITY: usize = 1024;

/// State shared across all connections: the store, configuration, and a
/// broadcast sender every accepted event is published to.
pub struct SharedState {
    pub store: Arc<EventStore>,
    pub config: RelayConfig,
    accepted: broadcast::Sender<Event>,
}

impl SharedState {
    pub fn new(store: Arc<EventStore>, config: RelayConfig) -> Arc<Self> {
        let (accepted, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Arc::new(SharedState { store, config, accepted })
    }
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new().route("/", get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<SharedState>) {
    let mut subs: HashMap<String, Vec<Filter>> = HashMap::new();
    let mut accepted_rx = state.accepted.subscribe();

    loop {
        tokio::select! {
            frame = socket.recv() => {
                let Some(frame) = frame else { break };
                let Ok(msg) = frame else { break };
                let WsMessage::Text(text) = msg else { continue };
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        if handle_client_message(&state, client_msg, &mut subs, &mut socket).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if send(&mut socket, &RelayMessage::notice(format!("could not parse message: {e}"))).await.is_err() {
                            break;
                        }
                    }
                }
            }
            event = accepted_rx.recv() => {
                let Ok(event) = event else { continue };
                for (sub_id, filters) in &subs {
                    if filters.iter().any(|f| f.matches(&event)) {
                        let msg = RelayMessage::Event { sub_id: sub_id.clone(), event: event.clone() };
                        if send(&mut socket, &msg).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_client_message(
    state: &Arc<SharedState>,
    msg: ClientMessage,
    subs: &mut HashMap<String, Vec<Filter>>,
    socket: &mut WebSocket,
) -> Result<(), ()> {
    match msg {
        ClientMessage::Event(event) => {
            let now = now_unix();
            let result = dispatch::admit(&state.store, &event, now, &state.config.verify_config());
            let ok_msg = match &result {
                Ok(()) => {
                    let _ = state.accepted.send(event.clone());
                    RelayMessage::ok(event.id.clone(), true, "")
                }
                Err(e) => RelayMessage::ok(event.id.clone(), false, e.wire_reason()),
            };
            send(socket, &ok_msg).await
        }
        ClientMessage::Req { sub_id, filters } => {
            let now = now_unix();
            for filter in &filters {
                let bounded = bound_limit(filter, state.config.default_query_limit, state.config.max_query_limit);
                match state.store.query(&bounded, now) {
                    Ok(events) => {
                        for event in events {
                            let msg = RelayMessage::Event { sub_id: sub_id.clone(), event };
                            send(socket, &msg).await?;
                        }
                    }
                    Err(_) => {
                        send(socket, &RelayMessage::notice("error: could not query store")).await?;
                    }
                }
            }
            subs.insert(sub_id.clone(), filters);
            send(socket, &RelayMessage::Eose { sub_id }).await
        }
        ClientMessage::Close { sub_id } => {
            subs.remove(&sub_id);
            send(socket, &RelayMessage::Closed { sub_id, reason: String::new() }).await
        }
    }
}

fn bound_limit(filter: &Filter, default_limit: usize, max_limit: usize) -> Filter {
    let mut bounded = filter.clone();
    bounded.limit = Some(filter.limit.unwrap_or(default_limit).min(max_limit));
    bounded
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs() as i64
}

async fn send(socket: &mut WebSocket, msg: &RelayMessage) -> Result<(), ()> {
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    socket.send(WsMessage::Text(text.into())).await.map_err(|_| ())
}
