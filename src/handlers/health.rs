// src/handlers/health.rs - liveness and readiness checks (outside the core
// ETSI surface per spec.md §6 "Auxiliary endpoints").
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::state::AppState;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "kme-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Validates the database connection and reports pool health alongside it.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => json!({ "status": "healthy" }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };
    let db_healthy = db_status["status"] == "healthy";

    let pool_status = match state.pool_manager.status().await {
        Ok(snapshot) => json!({
            "status": "healthy",
            "pool_health": format!("{:?}", snapshot.pool_health).to_lowercase(),
            "active_keys": snapshot.counters.active,
        }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };

    let overall = if db_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        overall,
        Json(json!({
            "status": if db_healthy { "ready" } else { "not_ready" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "services": { "database": db_status, "pool": pool_status },
        })),
    )
}
