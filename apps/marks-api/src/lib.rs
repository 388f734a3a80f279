pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::bookmarks::{BookmarkStore, MemoryBookmarkStore};
use db::kv::{KeyValueStore, MemoryStore};
use gateway::fanout::GatewayBroadcast;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub broadcast: Arc<GatewayBroadcast>,
}

impl AppState {
    pub fn new(config: Config, bookmarks: Arc<dyn BookmarkStore>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            bookmarks,
            kv,
            config: Arc::new(config),
            broadcast: Arc::new(GatewayBroadcast::new()),
        }
    }

    /// State backed entirely by in-process stores.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryBookmarkStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }
}

/// The full application: routes, CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
