use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lounge_api::config::{Config, PresenceBackend, StoreBackend};
use lounge_api::db::kv::{KeyValueStore, MemoryStore};
use lounge_api::db::memory::MemoryChatStore;
use lounge_api::db::pg::PgStore;
use lounge_api::db::redis_store::RedisStore;
use lounge_api::db::store::ChatStore;
use lounge_api::routes::ApiDoc;
use lounge_api::AppState;

#[tokio::main]
async fn main() {
    // Missing .env is fine; variables may come from the environment.
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

    let store: Arc<dyn ChatStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = lounge_api::db::pool::connect(&config.database_url)
                .expect("failed to create database pool");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory chat store; messages are lost on restart");
            Arc::new(MemoryChatStore::new())
        }
    };

    let kv: Arc<dyn KeyValueStore> = match config.presence_backend {
        PresenceBackend::Redis => Arc::new(
            RedisStore::connect(&config.redis_url)
                .await
                .expect("failed to connect to redis"),
        ),
        PresenceBackend::Memory => {
            tracing::warn!("using in-memory presence store; only valid for a single process");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(
        store = ?config.store_backend,
        presence = ?config.presence_backend,
        liveness_ttl = ?config.presence.liveness_ttl,
        heartbeat_interval = ?config.presence.heartbeat_interval,
        "lounge-api configured"
    );

    let state = AppState::new(config, store, kv);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(lounge_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "lounge-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("lounge-api stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
