// ABOUTME: HTTP API layer for Crosspost providing REST endpoints and routing
// ABOUTME: Integration layer that depends on the storage and connections packages

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use sqlx::SqlitePool;

use crosspost_connections::ConnectionManager;
use crosspost_storage::UserStorage;

pub mod auth;
pub mod connections_handlers;
pub mod error;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub users: Arc<UserStorage>,
}

impl AppState {
    pub fn new(pool: SqlitePool, manager: ConnectionManager) -> Self {
        Self {
            manager: Arc::new(manager),
            users: Arc::new(UserStorage::new(pool)),
        }
    }
}

/// Creates the connections API router
pub fn create_connections_router() -> Router<AppState> {
    Router::new()
        .route("/", get(connections_handlers::list_connections))
        .route("/providers", get(connections_handlers::list_providers))
        .route("/connect/{provider}", post(connections_handlers::connect))
        .route("/callback/{provider}", post(connections_handlers::callback))
        .route(
            "/refresh/{id}",
            post(connections_handlers::refresh_connection),
        )
        .route("/{id}", delete(connections_handlers::disconnect))
}

/// Creates the full application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/connections", create_connections_router())
        .with_state(state)
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
