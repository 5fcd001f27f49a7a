//! /message and /messages handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use cbc_services::listing::{CbsRow, EtwsRow};

use super::{on_owner, parse_message_id, ApiError, ApiState};
use crate::ecbe::EcbeMessage;

// ── /message (POST) ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CreateResponse {
    pub message_id: u16,
    pub serial_nr: u16,
    pub replaced: bool,
    /// Set when some peers could not be handed the message. It stays active.
    pub handoff_error: Option<String>,
}

pub async fn handle_create_message(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CreateResponse>, ApiError> {
    let message = EcbeMessage::from_json(body)
        .and_then(EcbeMessage::into_message)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let message_id = message.message_id();
    let serial_nr = message.serial_nr();
    tracing::info!(message_id, serial_nr, cbe = %message.cbe_name, "create via API");

    let created = on_owner(&state, move |bridge| bridge.create_message(message)).await?;
    Ok(Json(CreateResponse {
        message_id,
        serial_nr,
        replaced: created.replaced,
        handoff_error: created.handoff.map(|e| e.to_string()),
    }))
}

// ── /message/:message_id (DELETE) ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message_id: u16,
    pub existed: bool,
}

pub async fn handle_delete_message(
    State(state): State<ApiState>,
    Path(message_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let message_id = parse_message_id(&message_id)?;
    let existed = on_owner(&state, move |bridge| bridge.delete_message(message_id)).await?;
    Ok(Json(DeleteResponse {
        message_id,
        existed,
    }))
}

// ── /messages/cbs, /messages/etws (GET) ───────────────────────────────────────

pub async fn handle_list_cbs(State(state): State<ApiState>) -> Result<Json<Vec<CbsRow>>, ApiError> {
    let (cbs, _) = on_owner(&state, |bridge| bridge.list_messages()).await?;
    Ok(Json(cbs))
}

pub async fn handle_list_etws(
    State(state): State<ApiState>,
) -> Result<Json<Vec<EtwsRow>>, ApiError> {
    let (_, etws) = on_owner(&state, |bridge| bridge.list_messages()).await?;
    Ok(Json(etws))
}
