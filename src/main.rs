//! Planning Poker Back binary entrypoint wiring REST, WebSocket relay, and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planning_poker_back::{
    config::AppConfig,
    dao::{
        room_store::{RoomStore, memory::MemoryRoomStore},
        storage::StorageError,
    },
    routes,
    services::{retention, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    spawn_storage(app_state.clone()).await;
    tokio::spawn(retention::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the storage backend: MongoDB under supervision when `MONGO_URI` is
/// set, the in-process store otherwise.
async fn spawn_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    if let Ok(uri) = env::var("MONGO_URI") {
        let db_name = env::var("MONGO_DB").ok();
        tokio::spawn(storage_supervisor::run(state, move || {
            connect_mongo(uri.clone(), db_name.clone())
        }));
        return;
    }

    info!("MONGO_URI not set; using the in-memory store");
    state
        .install_room_store(Arc::new(MemoryRoomStore::default()))
        .await;
}

#[cfg(feature = "mongo-store")]
async fn connect_mongo(
    uri: String,
    db_name: Option<String>,
) -> Result<Arc<dyn RoomStore>, StorageError> {
    use planning_poker_back::dao::room_store::mongodb::{MongoConfig, MongoRoomStore};

    let config = MongoConfig::from_uri(&uri, db_name.as_deref())
        .await
        .map_err(StorageError::from)?;
    let store = MongoRoomStore::connect(config)
        .await
        .map_err(StorageError::from)?;
    Ok(Arc::new(store))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
