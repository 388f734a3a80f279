use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marks_api::config::Config;
use marks_api::db::bookmarks::{BookmarkStore, MemoryBookmarkStore, PgBookmarkStore};
use marks_api::db::kv::MemoryStore;
use marks_api::AppState;

/// How often expired tokens and tickets are swept from the KV store.
const KV_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let bookmarks: Arc<dyn BookmarkStore> = match &config.database_url {
        Some(url) => {
            let db = marks_api::db::pool::connect(url).expect("failed to create database pool");
            Arc::new(PgBookmarkStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, bookmarks are kept in memory");
            Arc::new(MemoryBookmarkStore::new())
        }
    };

    let kv = Arc::new(MemoryStore::new());
    spawn_kv_purge(kv.clone());

    tracing::info!(
        issuer = %config.identity_issuer,
        audience = %config.identity_audience,
        "marks-api configured"
    );

    let state = AppState::new(config, bookmarks, kv);
    let app = marks_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "marks-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn spawn_kv_purge(kv: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(KV_PURGE_INTERVAL);
        loop {
            tick.tick().await;
            let purged = kv.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired kv entries removed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
