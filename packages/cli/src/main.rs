// ABOUTME: Crosspost server entry point
// ABOUTME: Wires config, database, connection manager, CORS, and the HTTP listener

use axum::http::Method;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod config;

use config::Config;
use crosspost_api::{create_router, AppState};
use crosspost_connections::ConnectionManager;
use crosspost_storage::{init_pool, init_pool_at};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosspost=info,tower_http=warn".into()),
        )
        .init();

    let config = Config::from_env()?;

    let pool = match &config.database_path {
        Some(path) => init_pool_at(path.clone()).await?,
        None => init_pool().await?,
    };

    let manager = ConnectionManager::from_env(pool.clone());

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<axum::http::HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = create_router(AppState::new(pool, manager)).layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Crosspost server listening on http://{}", addr);
    info!("Dashboard origin: {}", config.cors_origin);

    axum::serve(listener, app).await?;

    Ok(())
}
