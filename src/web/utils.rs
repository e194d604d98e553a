//! Shared utility functions for the HTTP handlers.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::SocialError;
use crate::identity::{Actor, IdentitySession};

pub const USER_ID_HEADER: &str = "x-auth-user-id";
pub const USERNAME_HEADER: &str = "x-auth-username";
pub const FULL_NAME_HEADER: &str = "x-auth-full-name";
pub const FIRST_NAME_HEADER: &str = "x-auth-first-name";
pub const IMAGE_URL_HEADER: &str = "x-auth-image-url";

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

pub fn status_for(e: &SocialError) -> StatusCode {
    match e {
        SocialError::Validation(_) => StatusCode::BAD_REQUEST,
        SocialError::Unauthorized(_) => StatusCode::FORBIDDEN,
        SocialError::NotFound(_) => StatusCode::NOT_FOUND,
        SocialError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn error_response(e: &SocialError) -> Response {
    if let SocialError::Store(inner) = e {
        crate::alog!("web: store failure: {}", inner);
    }
    api_error(status_for(e), e.to_string())
}

/// 200 with the value as JSON, or the mapped error.
pub fn json_result<T: Serialize>(result: Result<T, SocialError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, axum::Json(value)).into_response(),
        Err(e) => error_response(&e),
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The identity provider's session as forwarded in request headers.
pub fn session_from_headers(headers: &HeaderMap) -> IdentitySession {
    IdentitySession {
        id: header(headers, USER_ID_HEADER).unwrap_or_default(),
        username: header(headers, USERNAME_HEADER),
        full_name: header(headers, FULL_NAME_HEADER),
        first_name: header(headers, FIRST_NAME_HEADER),
        image_url: header(headers, IMAGE_URL_HEADER),
    }
}

/// Resolve the calling actor, or the response to send instead.
pub fn session_actor(headers: &HeaderMap) -> Result<Actor, Response> {
    let session = session_from_headers(headers);
    if session.id.is_empty() {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            format!("missing {USER_ID_HEADER} header"),
        ));
    }
    Actor::from_session(&session).map_err(|e| error_response(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_comes_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        headers.insert(USERNAME_HEADER, HeaderValue::from_static("Ada"));
        headers.insert(FULL_NAME_HEADER, HeaderValue::from_static(" "));
        let actor = session_actor(&headers).unwrap();
        assert_eq!(actor.id, "u1");
        assert_eq!(actor.username, "ada");
        assert_eq!(actor.display_name, "ada");
    }

    #[test]
    fn missing_user_id_is_unauthorized() {
        let response = session_actor(&HeaderMap::new()).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            status_for(&SocialError::Validation(String::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SocialError::NotFound(String::new())),
            StatusCode::NOT_FOUND
        );
    }
}
