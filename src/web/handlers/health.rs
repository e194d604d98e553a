//! Health check endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let store_ok = state.atelier.store.read_once(crate::paths::USERS).is_ok();
    let ws_clients = state.ws_connection_count.load(Ordering::Relaxed);

    let body = serde_json::json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "store": store_ok,
        "ws_clients": ws_clients,
        "thread_limit": state.atelier.messenger.thread_limit(),
    });
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(body))
}
