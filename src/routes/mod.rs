// src/routes/mod.rs - the flat route table (spec.md §9: "explicit route
// table" over reflective/decorator-based wiring).
use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .nest("/api/v1", etsi_routes())
        .with_state(state)
}

fn etsi_routes() -> Router<AppState> {
    Router::new()
        .route("/keys/{slave_sae_id}/status", get(handlers::keys::get_status))
        .route("/keys/{slave_sae_id}/enc_keys", post(handlers::keys::enc_keys))
        .route("/keys/{master_sae_id}/dec_keys", post(handlers::keys::dec_keys))
}
