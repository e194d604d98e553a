//! Thread and conversation handlers.
//!
//! `:target` is either a user id or `global` for the community channel.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::SocialError;
use crate::messaging::{Media, MessageDraft, ThreadTarget};
use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

#[derive(Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    text: String,
    media_url: Option<String>,
    media_type: Option<String>,
}

impl SendMessageRequest {
    fn into_draft(self) -> MessageDraft {
        let media = self.media_url.map(|url| Media {
            url,
            media_type: self.media_type.unwrap_or_else(|| "image".to_string()),
        });
        MessageDraft {
            text: self.text,
            media,
        }
    }
}

/// GET /api/threads/:target - Read a thread.  Opening a direct thread
/// clears the caller's unread counter for it.
pub async fn get_thread_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let messenger = &state.atelier.messenger;
    let target = ThreadTarget::parse(&target);
    let result = messenger.thread_messages(&actor, &target).and_then(|messages| {
        let is_request = match &target {
            ThreadTarget::User(other) => {
                messenger.reset_unread(&actor, other)?;
                messenger.is_message_request(&actor, other)?
            }
            ThreadTarget::Global => false,
        };
        Ok(serde_json::json!({
            "thread_id": target.thread_id(&actor.id),
            "messages": messages,
            "is_request": is_request,
        }))
    });
    json_result(result)
}

/// POST /api/threads/:target - Send a message.  A target with no user
/// record is answered with 204 and nothing is written.
pub async fn send_message_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(target): Path<String>,
    axum::Json(req): axum::Json<SendMessageRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let target = ThreadTarget::parse(&target);
    match state
        .atelier
        .messenger
        .send_message(&actor, &target, &req.into_draft())
    {
        Ok(message) => (StatusCode::CREATED, axum::Json(message)).into_response(),
        Err(SocialError::NotFound(what)) => {
            crate::alog!(
                "web: dropped message from {} to missing {}",
                crate::logging::user_id(&actor.id),
                what
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /api/conversations - The caller's conversation list.
pub async fn list_conversations_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.messenger.conversations(&actor))
}

/// GET /api/unread - Unread counters by sender.
pub async fn unread_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.messenger.unread_counts(&actor))
}
