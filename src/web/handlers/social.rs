//! Follow and friend handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::policy::PresetPrompt;
use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

/// Answers to the confirmation and passcode gate, passed as query
/// parameters on destructive calls.
#[derive(Deserialize, Default)]
pub struct GateParams {
    confirm: Option<bool>,
    passcode: Option<String>,
}

impl GateParams {
    fn prompt(self) -> PresetPrompt {
        PresetPrompt {
            confirmed: self.confirm.unwrap_or(false),
            passcode: self.passcode,
        }
    }
}

fn ok_status(status: &str, user_id: &str) -> Response {
    let json = serde_json::json!({
        "status": status,
        "user_id": user_id,
    });
    (StatusCode::OK, axum::Json(json)).into_response()
}

/// POST /api/social/:user_id/follow
pub async fn follow_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.social.follow(&actor, &user_id) {
        Ok(()) => ok_status("following", &user_id),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/social/:user_id/follow?passcode=1234
pub async fn unfollow_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(gate): Query<GateParams>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let mut prompt = gate.prompt();
    match state.atelier.social.unfollow(&actor, &user_id, &mut prompt) {
        Ok(()) => ok_status("unfollowed", &user_id),
        Err(e) => error_response(&e),
    }
}

/// POST /api/social/:user_id/friend-request
pub async fn send_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let social = &state.atelier.social;
    match social.friend_status(&actor.id, &user_id) {
        Ok(crate::social::FriendStatus::None) => {}
        Ok(status) => {
            let json = serde_json::json!({ "status": status, "user_id": user_id });
            return (StatusCode::CONFLICT, axum::Json(json)).into_response();
        }
        Err(e) => return error_response(&e),
    }
    match social.request_friend(&actor, &user_id) {
        Ok(()) => ok_status("request_sent", &user_id),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/social/:user_id/friend-request - Withdraw a pending request.
pub async fn cancel_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.social.cancel_request(&actor, &user_id) {
        Ok(()) => ok_status("none", &user_id),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub struct RespondRequest {
    accept: bool,
}

/// POST /api/social/:user_id/friend-request/respond
pub async fn respond_friend_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<RespondRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .social
        .respond_to_request(&actor, &user_id, req.accept)
    {
        Ok(status) => {
            let json = serde_json::json!({ "status": status, "user_id": user_id });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/social/:user_id/friend?confirm=true&passcode=1234
pub async fn unfriend_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(gate): Query<GateParams>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let mut prompt = gate.prompt();
    match state.atelier.social.unfriend(&actor, &user_id, &mut prompt) {
        Ok(()) => ok_status("none", &user_id),
        Err(e) => error_response(&e),
    }
}

/// GET /api/social/:user_id/status - Friend and follow state towards a user.
pub async fn status_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let social = &state.atelier.social;
    let result = social.friend_status(&actor.id, &user_id).and_then(|status| {
        Ok(serde_json::json!({
            "user_id": user_id,
            "status": status,
            "following": social.is_following(&actor.id, &user_id)?,
            "followed_by": social.is_following(&user_id, &actor.id)?,
        }))
    });
    json_result(result)
}

/// GET /api/social/:user_id/followers
pub async fn followers_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.social.followers(&actor, &user_id))
}

/// GET /api/social/:user_id/following
pub async fn following_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.social.following(&actor, &user_id))
}

/// GET /api/social/:user_id/friends
pub async fn friends_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.social.friends(&actor, &user_id))
}

/// GET /api/friend-requests - Pending requests the caller has received.
pub async fn incoming_requests_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.social.incoming_requests(&actor))
}
