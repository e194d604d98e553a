//! atelier-web: HTTP and WebSocket surface over the engines.
//!
//! The caller's identity arrives in `x-auth-*` headers set by the identity
//! provider's proxy; see [`utils::session_actor`].

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;

use crate::app::Atelier;
use crate::policy::AccessPolicy;
use crate::store::{MemoryStore, RealtimeStore, SqliteStore};

use config::{Cli, Config};
use state::{AppState, SharedState};

pub type RunError = Box<dyn std::error::Error + Send + Sync>;

/// Open the configured store and wire the engines.
pub fn build_state(config: &Config) -> Result<SharedState, RunError> {
    let store: Arc<dyn RealtimeStore> = if config.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        std::fs::create_dir_all(&config.data_dir)?;
        Arc::new(SqliteStore::open(&config.db_path())?)
    };
    let policy = AccessPolicy::new(&config.owner_handle, &config.restricted_handle)
        .with_admins(&config.admins);
    let atelier = Atelier::new(store, policy).with_thread_limit(config.thread_limit);
    Ok(Arc::new(AppState::new(atelier)))
}

/// Entry point: parse CLI, open the store, start server.
pub async fn run() -> Result<(), RunError> {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli)?;

    crate::logging::init();

    crate::alog!("atelier-web starting");
    crate::alog!("  data directory: {}", config.data_dir.display());
    if config.in_memory {
        crate::alog!("  store: in memory (nothing is persisted)");
    } else {
        crate::alog!("  database: {}", config.db_path().display());
    }
    if config.owner_handle.is_empty() {
        crate::alog!("  owner handle: none configured (reports will be dropped)");
    } else {
        crate::alog!("  owner handle: @{}", config.owner_handle);
    }
    crate::alog!("  admins: {}", config.admins.len());

    let state = build_state(&config)?;
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    crate::alog!("atelier-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
