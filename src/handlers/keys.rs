// src/handlers/keys.rs - the three ETSI GS QKD 014 endpoints. Thin: every
// handler extracts the authenticated SAE identity and path parameters,
// then hands off to the request pipeline; no business logic lives here.
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};

use crate::extractors::SaeIdentity;
use crate::middleware::error_handler::KmeError;
use crate::models::etsi::{KeyIds, KeyRequest};
use crate::services::pipeline;
use crate::state::AppState;

/// GET /api/v1/keys/{slave_SAE_ID}/status
pub async fn get_status(
    State(state): State<AppState>,
    caller: SaeIdentity,
    Path(slave_sae_id): Path<String>,
) -> Result<impl IntoResponse, KmeError> {
    let status = pipeline::get_status(&state, &caller.sae_id, &slave_sae_id).await?;
    Ok(Json(status))
}

/// POST /api/v1/keys/{slave_SAE_ID}/enc_keys
pub async fn enc_keys(
    State(state): State<AppState>,
    caller: SaeIdentity,
    Path(slave_sae_id): Path<String>,
    Json(request): Json<KeyRequest>,
) -> Result<impl IntoResponse, KmeError> {
    let container = pipeline::enc_keys(&state, &caller.sae_id, &slave_sae_id, request).await?;
    Ok(Json(container))
}

/// POST /api/v1/keys/{master_SAE_ID}/dec_keys
pub async fn dec_keys(
    State(state): State<AppState>,
    caller: SaeIdentity,
    Path(master_sae_id): Path<String>,
    Json(request): Json<KeyIds>,
) -> Result<impl IntoResponse, KmeError> {
    let container = pipeline::dec_keys(&state, &caller.sae_id, &master_sae_id, request).await?;
    Ok(Json(container))
}
