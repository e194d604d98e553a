//! Axum router construction.

use axum::routing::{get, post, put};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Session / users / profile
        .route("/api/session", post(handlers::session::login_handler))
        .route(
            "/api/users/:username",
            get(handlers::session::get_user_handler),
        )
        .route(
            "/api/profile",
            get(handlers::session::get_profile_handler)
                .put(handlers::session::update_profile_handler),
        )
        .route(
            "/api/profile/passcode",
            put(handlers::session::set_passcode_handler),
        )
        // Social graph
        .route(
            "/api/social/:user_id/follow",
            post(handlers::social::follow_handler).delete(handlers::social::unfollow_handler),
        )
        .route(
            "/api/social/:user_id/friend-request",
            post(handlers::social::send_friend_request_handler)
                .delete(handlers::social::cancel_friend_request_handler),
        )
        .route(
            "/api/social/:user_id/friend-request/respond",
            post(handlers::social::respond_friend_request_handler),
        )
        .route(
            "/api/social/:user_id/friend",
            axum::routing::delete(handlers::social::unfriend_handler),
        )
        .route(
            "/api/social/:user_id/status",
            get(handlers::social::status_handler),
        )
        .route(
            "/api/social/:user_id/followers",
            get(handlers::social::followers_handler),
        )
        .route(
            "/api/social/:user_id/following",
            get(handlers::social::following_handler),
        )
        .route(
            "/api/social/:user_id/friends",
            get(handlers::social::friends_handler),
        )
        .route(
            "/api/friend-requests",
            get(handlers::social::incoming_requests_handler),
        )
        // Threads / conversations
        .route(
            "/api/threads/:target",
            get(handlers::threads::get_thread_handler)
                .post(handlers::threads::send_message_handler),
        )
        .route(
            "/api/conversations",
            get(handlers::threads::list_conversations_handler),
        )
        .route("/api/unread", get(handlers::threads::unread_handler))
        // Notifications
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications_handler),
        )
        .route(
            "/api/notifications/read-all",
            post(handlers::notifications::mark_all_read_handler),
        )
        .route(
            "/api/notifications/:id/read",
            post(handlers::notifications::mark_read_handler),
        )
        // Explore posts
        .route(
            "/api/posts",
            get(handlers::posts::list_posts_handler).post(handlers::posts::create_post_handler),
        )
        .route("/api/posts/:post_id", get(handlers::posts::get_post_handler))
        .route(
            "/api/posts/:post_id/like",
            post(handlers::posts::like_post_handler),
        )
        .route(
            "/api/posts/:post_id/comments",
            post(handlers::posts::comment_handler),
        )
        .route(
            "/api/posts/:post_id/comments/:comment_id/like",
            post(handlers::posts::like_comment_handler),
        )
        .route(
            "/api/posts/:post_id/comments/:comment_id/replies",
            post(handlers::posts::reply_handler),
        )
        .route(
            "/api/posts/:post_id/comments/:comment_id/replies/:reply_id/like",
            post(handlers::posts::like_reply_handler),
        )
        // Moderation
        .route(
            "/api/moderation/:user_id/lock",
            post(handlers::moderation::lock_handler),
        )
        .route(
            "/api/moderation/:user_id/unlock",
            post(handlers::moderation::unlock_handler),
        )
        .route(
            "/api/moderation/:user_id/warn",
            post(handlers::moderation::warn_handler),
        )
        .route(
            "/api/moderation/:user_id/badge",
            post(handlers::moderation::badge_handler),
        )
        .route(
            "/api/moderation/:user_id/report",
            post(handlers::moderation::report_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
