//! Shared application state and WebSocket event types.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::app::Atelier;
use crate::model::Message;
use crate::notifications::NotificationEntry;
use crate::social::FriendStatus;

/// Events pushed to a connected WebSocket client from its live
/// subscriptions.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Notifications {
        entries: Vec<NotificationEntry>,
        unread: usize,
    },
    Thread {
        thread_id: String,
        messages: Vec<Message>,
    },
    FriendStatus {
        user_id: String,
        status: FriendStatus,
    },
    EventsMissed {
        count: usize,
    },
    Error {
        error: String,
    },
}

pub struct AppState {
    pub atelier: Atelier,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(atelier: Atelier) -> Self {
        Self {
            atelier,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub type SharedState = Arc<AppState>;
