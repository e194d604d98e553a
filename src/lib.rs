pub mod logging;

pub mod app;
pub mod content;
pub mod directory;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod model;
pub mod moderation;
pub mod notifications;
pub mod paths;
pub mod policy;
pub mod social;
pub mod store;
pub mod web;

pub use app::Atelier;
pub use error::SocialError;
