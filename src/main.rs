use anyhow::Context;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use helpdesk_server::api_router::configure_api_routes;
use helpdesk_server::bootstrap;
use helpdesk_server::config::AppConfig;
use helpdesk_server::shared::state::{create_pool, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let pool = create_pool(&config.database_url()).context("failed to create database pool")?;

    bootstrap::run(&pool).context("bootstrap failed")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        conn: pool,
        config,
    });

    let app = configure_api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("helpdesk server listening on {addr}");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
