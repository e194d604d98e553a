//! Moderation and report handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

#[derive(Deserialize)]
pub struct LockRequest {
    /// Milliseconds since epoch.
    until: u64,
}

/// POST /api/moderation/:user_id/lock
pub async fn lock_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<LockRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.moderation.lock_user(&actor, &user_id, req.until))
}

/// POST /api/moderation/:user_id/unlock
pub async fn unlock_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.moderation.unlock_user(&actor, &user_id))
}

#[derive(Deserialize)]
pub struct WarnRequest {
    /// `null` clears the warning.
    text: Option<String>,
}

/// POST /api/moderation/:user_id/warn
pub async fn warn_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<WarnRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let moderation = &state.atelier.moderation;
    json_result(match req.text {
        Some(text) => moderation.warn_user(&actor, &user_id, &text),
        None => moderation.clear_warning(&actor, &user_id),
    })
}

#[derive(Deserialize)]
pub struct BadgeRequest {
    badge: Option<String>,
}

/// POST /api/moderation/:user_id/badge
pub async fn badge_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<BadgeRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(
        state
            .atelier
            .moderation
            .set_badge(&actor, &user_id, req.badge.as_deref()),
    )
}

#[derive(Deserialize)]
pub struct ReportRequest {
    reason: String,
}

/// POST /api/moderation/:user_id/report - Any user may report another.
pub async fn report_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<ReportRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .moderation
        .report_user(&actor, &user_id, &req.reason)
    {
        Ok(delivered) => {
            let json = serde_json::json!({
                "status": "ok",
                "delivered": delivered,
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
