//! Combines the REST routes from all modules into a unified router.

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

/// Configure all API routes from all modules.
pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::tickets::analytics::configure_analytics_routes())
        .merge(crate::kb::configure_kb_routes())
        .merge(crate::notifications::configure_notification_routes())
        .merge(crate::directory::configure_directory_routes())
        .merge(crate::audit::configure_audit_routes())
        .route("/health", get(handle_health))
}

async fn handle_health() -> axum::Json<serde_json::Value> {
    axum::Json(
        serde_json::json!({"status": "healthy", "timestamp": chrono::Utc::now().to_rfc3339()}),
    )
}
