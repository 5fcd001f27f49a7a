//! /peers and /status handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use cbc_core::config::PeerConfig;
use cbc_services::bridge::CountersSnapshot;
use cbc_services::listing::PeerRow;

use super::{on_owner, ApiError, ApiState};

// ── /peers (GET) ──────────────────────────────────────────────────────────────

pub async fn handle_peers(State(state): State<ApiState>) -> Result<Json<Vec<PeerRow>>, ApiError> {
    let peers = on_owner(&state, |bridge| bridge.list_peers()).await?;
    Ok(Json(peers))
}

// ── /peers (POST) ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerAddResponse {
    pub name: String,
    pub id: u64,
}

pub async fn handle_peer_add(
    State(state): State<ApiState>,
    Json(peer): Json<PeerConfig>,
) -> Result<Json<PeerAddResponse>, ApiError> {
    let name = peer.name.clone();
    let id = on_owner(&state, move |bridge| bridge.add_peer(peer)).await?;
    Ok(Json(PeerAddResponse { name, id: id.0 }))
}

// ── /peers/:name (DELETE) ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerRemoveResponse {
    pub name: String,
    pub existed: bool,
}

pub async fn handle_peer_remove(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<PeerRemoveResponse>, ApiError> {
    let lookup = name.clone();
    let existed = on_owner(&state, move |bridge| bridge.remove_peer(&lookup)).await?;
    Ok(Json(PeerRemoveResponse { name, existed }))
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub peers: usize,
    pub cbs_messages: usize,
    pub etws_messages: usize,
    pub sessions: Vec<SessionInfo>,
    pub bridge: BridgeInfo,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub peer: String,
    pub remote: String,
    pub established_secs: u64,
}

#[derive(Serialize)]
pub struct BridgeInfo {
    pub timeout_ms: u64,
    pub signaled: u64,
    pub abandoned: u64,
    pub completed_after_abandon: u64,
}

impl BridgeInfo {
    fn new(timeout_ms: u64, c: CountersSnapshot) -> Self {
        Self {
            timeout_ms,
            signaled: c.signaled,
            abandoned: c.abandoned,
            completed_after_abandon: c.completed_after_abandon,
        }
    }
}

pub async fn handle_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let (peers, (cbs, etws)) = on_owner(&state, |bridge| {
        Ok((bridge.list_peers()?.len(), bridge.list_messages()?))
    })
    .await?;

    let sessions = state
        .sessions
        .iter()
        .map(|e| SessionInfo {
            peer: e.key().to_string(),
            remote: e.value().remote.to_string(),
            established_secs: e.value().established_at.elapsed().as_secs(),
        })
        .collect();

    let bridge = &state.bridge;
    Ok(Json(StatusResponse {
        peers,
        cbs_messages: cbs.len(),
        etws_messages: etws.len(),
        sessions,
        bridge: BridgeInfo::new(bridge.timeout().as_millis() as u64, bridge.counters()),
    }))
}
