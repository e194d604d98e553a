//! Notification handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

/// GET /api/notifications - Coalesced inbox, newest first.
pub async fn list_notifications_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let center = &state.atelier.notifications;
    let result = center.entries(&actor.id).and_then(|entries| {
        Ok(serde_json::json!({
            "entries": entries,
            "unread": center.unread_count(&actor.id)?,
        }))
    });
    json_result(result)
}

/// POST /api/notifications/:id/read - Mark a notification as read.
pub async fn mark_read_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.notifications.mark_read(&actor.id, &id) {
        Ok(()) => {
            let json = serde_json::json!({
                "status": "ok",
                "id": id,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /api/notifications/read-all - Mark all notifications as read.
pub async fn mark_all_read_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.notifications.mark_all_read(&actor.id) {
        Ok(count) => {
            let json = serde_json::json!({
                "status": "ok",
                "marked_read": count,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
