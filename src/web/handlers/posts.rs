//! Explore post, like, comment and reply handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::content::PostDraft;
use crate::messaging::Media;
use crate::web::state::SharedState;
use crate::web::utils::{error_response, json_result, session_actor};

#[derive(Deserialize)]
pub struct FeedQuery {
    limit: Option<usize>,
}

/// GET /api/posts - Most recent posts first.
pub async fn list_posts_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<FeedQuery>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let limit = params.limit.map(|l| l.clamp(1, 200));
    json_result(state.atelier.content.feed(&actor, limit))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    text: String,
    media_url: Option<String>,
    media_type: Option<String>,
}

/// POST /api/posts
pub async fn create_post_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<CreatePostRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let draft = PostDraft {
        text: req.text,
        media: req.media_url.map(|url| Media {
            url,
            media_type: req.media_type.unwrap_or_else(|| "image".to_string()),
        }),
    };
    match state.atelier.content.create_post(&actor, draft) {
        Ok(post) => (StatusCode::CREATED, axum::Json(post)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/posts/:post_id
pub async fn get_post_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    json_result(state.atelier.content.post_view(&actor, &post_id))
}

fn liked_response(liked: bool) -> Response {
    let json = serde_json::json!({ "liked": liked });
    (StatusCode::OK, axum::Json(json)).into_response()
}

/// POST /api/posts/:post_id/like - Toggle the caller's like.
pub async fn like_post_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.content.toggle_like(&actor, &post_id) {
        Ok(liked) => liked_response(liked),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub struct TextRequest {
    text: String,
}

/// POST /api/posts/:post_id/comments
pub async fn comment_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    axum::Json(req): axum::Json<TextRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state.atelier.content.post_comment(&actor, &post_id, &req.text) {
        Ok(comment) => (StatusCode::CREATED, axum::Json(comment)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/posts/:post_id/comments/:comment_id/like
pub async fn like_comment_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .content
        .toggle_comment_like(&actor, &post_id, &comment_id)
    {
        Ok(liked) => liked_response(liked),
        Err(e) => error_response(&e),
    }
}

/// POST /api/posts/:post_id/comments/:comment_id/replies
pub async fn reply_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((post_id, comment_id)): Path<(String, String)>,
    axum::Json(req): axum::Json<TextRequest>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .content
        .post_reply(&actor, &post_id, &comment_id, &req.text)
    {
        Ok(reply) => (StatusCode::CREATED, axum::Json(reply)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/posts/:post_id/comments/:comment_id/replies/:reply_id/like
pub async fn like_reply_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((post_id, comment_id, reply_id)): Path<(String, String, String)>,
) -> Response {
    let actor = match session_actor(&headers) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    match state
        .atelier
        .content
        .toggle_reply_like(&actor, &post_id, &comment_id, &reply_id)
    {
        Ok(liked) => liked_response(liked),
        Err(e) => error_response(&e),
    }
}
