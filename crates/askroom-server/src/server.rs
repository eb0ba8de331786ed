//! Router assembly and listener startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use askroom_store::Store;
use axum::routing::{get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatcher::EventDispatcher;
use crate::handlers;
use crate::registry::RoomRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::socket::HeartbeatSettings;
use crate::subscription::SubscriptionManager;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<RoomRegistry>,
    pub dispatcher: EventDispatcher,
    pub subscriptions: Arc<SubscriptionManager>,
    pub heartbeat: HeartbeatSettings,
    pub start_time: Instant,
}

impl AppState {
    /// Wire a fresh registry around `store`. Subscriptions end when `shutdown` fires.
    pub fn new(store: Arc<dyn Store>, config: &ServerConfig, shutdown: CancellationToken) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            shutdown,
            config.send_queue_capacity,
        );
        Self {
            dispatcher: EventDispatcher::new(Arc::clone(&registry)),
            subscriptions: Arc::new(subscriptions),
            heartbeat: HeartbeatSettings {
                interval: config.heartbeat_interval(),
                timeout: config.heartbeat_timeout(),
            },
            start_time: Instant::now(),
            registry,
            store,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/subscribe/{room_id}", get(handlers::subscribe))
        .route("/api/rooms", post(handlers::create_room).get(handlers::list_rooms))
        .route("/api/rooms/{room_id}", get(handlers::get_room))
        .route(
            "/api/rooms/{room_id}/messages",
            post(handlers::create_message).get(handlers::list_messages),
        )
        .route("/api/rooms/{room_id}/messages/{message_id}", get(handlers::get_message))
        .route(
            "/api/rooms/{room_id}/messages/{message_id}/react",
            patch(handlers::add_reaction).delete(handlers::remove_reaction),
        )
        .route(
            "/api/rooms/{room_id}/messages/{message_id}/answer",
            patch(handlers::mark_answered),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and serve until the coordinator fires.
pub async fn start(
    config: &ServerConfig,
    store: Arc<dyn Store>,
    shutdown: &ShutdownCoordinator,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(store, config, shutdown.token());
    let router = build_router(state.clone());

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "askroom server listening");

    let token = shutdown.token();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        match result {
            Ok(()) => info!("server stopped"),
            Err(e) => error!(error = %e, "server error"),
        }
    });

    Ok(ServerHandle { addr, state, task })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    state: AppState,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.state.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.state.store
    }

    /// The serve task, for awaiting during shutdown.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}
