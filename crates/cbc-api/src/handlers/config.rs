//! /config handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use cbc_core::UnknownPeerPolicy;

use super::{on_owner, ApiError, ApiState};

// ── /config (GET) ─────────────────────────────────────────────────────────────

pub async fn handle_running_config(State(state): State<ApiState>) -> Result<String, ApiError> {
    on_owner(&state, |bridge| bridge.running_config()).await
}

// ── /config/write (POST) ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConfigWriteResponse {
    pub path: String,
    pub peers: usize,
}

pub async fn handle_config_write(
    State(state): State<ApiState>,
) -> Result<Json<ConfigWriteResponse>, ApiError> {
    let base = state.base_config.as_ref().clone();
    let snapshot = on_owner(&state, move |bridge| bridge.config_snapshot(base)).await?;

    let path = state.config_path.clone();
    let peers = snapshot.peers.len();
    let written = path.clone();
    tokio::task::spawn_blocking(move || snapshot.save_to(&written))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("write task failed: {e}")))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(path = %path.display(), peers, "configuration written");
    Ok(Json(ConfigWriteResponse {
        path: path.display().to_string(),
        peers,
    }))
}

// ── /config/unknown-peers (PUT) ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UnknownPeersRequest {
    pub policy: UnknownPeerPolicy,
}

pub async fn handle_unknown_peers(
    State(state): State<ApiState>,
    Json(req): Json<UnknownPeersRequest>,
) -> Result<StatusCode, ApiError> {
    on_owner(&state, move |bridge| bridge.set_unknown_peers(req.policy)).await?;
    Ok(StatusCode::NO_CONTENT)
}
