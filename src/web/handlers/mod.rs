//! Route handler modules for the atelier REST API.

pub mod health;
pub mod moderation;
pub mod notifications;
pub mod posts;
pub mod session;
pub mod social;
pub mod threads;
pub mod websocket;
