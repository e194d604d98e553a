//! Session sign-in, user lookup and profile handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::directory::ProfileUpdate;
use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

/// POST /api/session - Create or refresh the caller's user record.
pub async fn login_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.directory.upsert_on_login(&actor))
}

/// GET /api/users/:username - Look up a user by handle, masked for the caller.
pub async fn get_user_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(
        state
            .atelier
            .directory
            .view_by_username(&actor.username, &username),
    )
}

/// GET /api/profile - The caller's own record.
pub async fn get_profile_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.directory.require(&actor.id))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    name: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
}

/// PUT /api/profile - Edit the caller's profile.
pub async fn update_profile_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<UpdateProfileRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let update = ProfileUpdate {
        name: req.name,
        username: req.username,
        avatar_url: req.avatar_url,
    };
    json_result(state.atelier.directory.update_profile(&actor, update))
}

#[derive(Deserialize)]
pub struct PasscodeRequest {
    passcode: Option<String>,
}

/// PUT /api/profile/passcode - Set or clear (`null`) the chat passcode.
pub async fn set_passcode_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<PasscodeRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .directory
        .set_passcode(&actor, req.passcode.as_deref())
    {
        Ok(()) => {
            let json = serde_json::json!({
                "status": "ok",
                "has_passcode": req.passcode.is_some(),
            });
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => error_response(&e),
    }
}
