//! WebSocket upgrade and connection handling.
//!
//! Each connection belongs to one actor and owns its live store
//! subscriptions: the inbox is watched from the start, threads and friend
//! statuses on request.  Everything is released when the socket closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::SocialError;
use crate::identity::Actor;
use crate::messaging::{ThreadSubscription, ThreadTarget};
use crate::notifications::InboxWatch;
use crate::social::FriendStatusWatch;
use crate::web::config::{MAX_WS_CONNECTIONS, WS_CHANNEL_CAPACITY};
use crate::web::state::{SharedState, WsEvent};
use crate::web::utils::{api_error, session_actor};

/// Commands a client may send over the socket.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    OpenThread { target: String },
    CloseThread { target: String },
    WatchStatus { user_id: String },
    UnwatchStatus { user_id: String },
}

/// Where store callbacks drop events for the socket task.  Callbacks run on
/// writer threads and must not block, so a full queue drops and counts.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::Sender<WsEvent>,
    missed: Arc<AtomicUsize>,
}

impl EventSink {
    fn push(&self, event: WsEvent) {
        if self.tx.try_send(event).is_err() {
            self.missed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct LiveViews {
    inbox: Option<InboxWatch>,
    threads: HashMap<String, ThreadSubscription>,
    statuses: HashMap<String, FriendStatusWatch>,
}

impl LiveViews {
    fn handle(&mut self, state: &SharedState, actor: &Actor, sink: &EventSink, text: &str) {
        let command = match serde_json::from_str::<ClientCommand>(text) {
            Ok(c) => c,
            Err(e) => {
                sink.push(WsEvent::Error {
                    error: format!("unrecognised command: {e}"),
                });
                return;
            }
        };
        if let Err(e) = self.apply(state, actor, sink, command) {
            sink.push(WsEvent::Error {
                error: e.to_string(),
            });
        }
    }

    fn apply(
        &mut self,
        state: &SharedState,
        actor: &Actor,
        sink: &EventSink,
        command: ClientCommand,
    ) -> Result<(), SocialError> {
        match command {
            ClientCommand::OpenThread { target } => {
                let target = ThreadTarget::parse(&target);
                let thread_id = target.thread_id(&actor.id);
                let events = sink.clone();
                let tid = thread_id.clone();
                let sub = state.atelier.messenger.open_thread(
                    actor,
                    &target,
                    Box::new(move |messages| {
                        events.push(WsEvent::Thread {
                            thread_id: tid.clone(),
                            messages,
                        })
                    }),
                )?;
                self.threads.insert(thread_id, sub);
            }
            ClientCommand::CloseThread { target } => {
                let thread_id = ThreadTarget::parse(&target).thread_id(&actor.id);
                self.threads.remove(&thread_id);
            }
            ClientCommand::WatchStatus { user_id } => {
                let events = sink.clone();
                let other = user_id.clone();
                let watch = state.atelier.social.watch_friend_status(
                    &actor.id,
                    &user_id,
                    Box::new(move |status| {
                        events.push(WsEvent::FriendStatus {
                            user_id: other.clone(),
                            status,
                        })
                    }),
                )?;
                self.statuses.insert(user_id, watch);
            }
            ClientCommand::UnwatchStatus { user_id } => {
                self.statuses.remove(&user_id);
            }
        }
        Ok(())
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    // Check connection limit before upgrading
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "too many WebSocket connections (max {})",
                MAX_WS_CONNECTIONS
            ),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, actor))
        .into_response()
}

async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(WsMessage::Text(json)).await.is_ok(),
        Err(_) => true,
    }
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, actor: Actor) {
    let ws_count = state.ws_connection_count.clone();
    ws_count.fetch_add(1, Ordering::Relaxed);
    crate::alog!("ws: {} connected", crate::logging::user_id(&actor.id));
    if let Err(e) = state.atelier.directory.touch(&actor.id) {
        crate::alog!(
            "ws: activity not recorded for {}: {}",
            crate::logging::user_id(&actor.id),
            e
        );
    }

    let (tx, mut rx) = mpsc::channel(WS_CHANNEL_CAPACITY);
    let sink = EventSink {
        tx,
        missed: Arc::new(AtomicUsize::new(0)),
    };
    let mut live = LiveViews::default();

    let events = sink.clone();
    match state.atelier.notifications.watch(
        &actor.id,
        Box::new(move |entries| {
            let unread = entries
                .iter()
                .filter(|e| !e.global && !e.notification.read)
                .count();
            events.push(WsEvent::Notifications { entries, unread })
        }),
    ) {
        Ok(watch) => live.inbox = Some(watch),
        Err(e) => sink.push(WsEvent::Error {
            error: e.to_string(),
        }),
    }

    loop {
        tokio::select! {
            // Forward subscription events to the WebSocket client
            event = rx.recv() => {
                let Some(event) = event else { break };
                if !send_event(&mut socket, &event).await {
                    break; // client disconnected
                }
                let missed = sink.missed.swap(0, Ordering::Relaxed);
                if missed > 0 {
                    crate::alog!("ws client lagged, skipped {missed} events");
                    // Notify client so it can refresh
                    if !send_event(&mut socket, &WsEvent::EventsMissed { count: missed }).await {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Text(text))) => live.handle(&state, &actor, &sink, &text),
                    _ => {}
                }
            }
        }
    }

    // Tear down subscriptions before the count drops
    drop(live);
    ws_count.fetch_sub(1, Ordering::Relaxed);
    crate::alog!("ws: {} disconnected", crate::logging::user_id(&actor.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"open_thread","target":"global"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::OpenThread {
                target: "global".to_string()
            }
        );
        assert!(serde_json::from_str::<ClientCommand>(r#"{"action":"explode"}"#).is_err());
    }

    #[test]
    fn full_sink_counts_missed_events() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = EventSink {
            tx,
            missed: Arc::new(AtomicUsize::new(0)),
        };
        sink.push(WsEvent::EventsMissed { count: 0 });
        sink.push(WsEvent::EventsMissed { count: 0 });
        assert_eq!(sink.missed.load(Ordering::Relaxed), 1);
    }
}
