//! # askroom-server
//!
//! Live Q&A rooms over HTTP and WebSocket.
//!
//! - Room registry: per-room watcher sets with mutually exclusive register,
//!   unregister and broadcast
//! - Subscription lifecycle: one cancellation token per watcher, teardown on drop
//! - Event dispatch after every acknowledged write
//! - Axum routes for rooms and messages, `/health`, graceful shutdown

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health;
pub mod heartbeat;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod socket;
pub mod subscription;

pub use config::{AppConfig, ConfigError, ServerConfig};
pub use dispatcher::EventDispatcher;
pub use error::ApiError;
pub use registry::{BroadcastReport, RoomRegistry};
pub use server::{build_router, start, AppState, ServerHandle};
pub use shutdown::ShutdownCoordinator;
pub use subscription::{SubscribeError, Subscription, SubscriptionManager};
