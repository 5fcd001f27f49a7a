//! HTTP handlers. Every read or write of CBC state goes through the
//! [`Bridge`] to the owner thread.

pub mod config;
pub mod messages;
pub mod peers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;

use cbc_core::config::CbcConfig;
use cbc_services::session::SessionTable;
use cbc_services::{Bridge, BridgeError};

#[derive(Clone)]
pub struct ApiState {
    pub bridge: Bridge,
    /// Live RAN sessions, read-only here.
    pub sessions: SessionTable,
    /// Configuration the daemon booted with. `config write` merges the live
    /// peers into it.
    pub base_config: Arc<CbcConfig>,
    pub config_path: PathBuf,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub type ApiError = (StatusCode, String);

fn bridge_error(e: BridgeError) -> ApiError {
    let status = match e {
        BridgeError::EnqueueFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

/// Run a blocking bridge call off the async workers.
async fn on_owner<T, F>(state: &ApiState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Bridge) -> Result<T, BridgeError> + Send + 'static,
    T: Send + 'static,
{
    let bridge = state.bridge.clone();
    tokio::task::spawn_blocking(move || f(&bridge))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("bridge task failed: {e}")))?
        .map_err(bridge_error)
}

/// Message ids are decimal, or hex with a `0x` prefix.
fn parse_message_id(s: &str) -> Result<u16, ApiError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid message_id '{s}'")))
}

// Re-export handler functions for use in router setup.
pub use config::{handle_config_write, handle_running_config, handle_unknown_peers};
pub use messages::{
    handle_create_message, handle_delete_message, handle_list_cbs, handle_list_etws,
};
pub use peers::{handle_peer_add, handle_peer_remove, handle_peers, handle_status};
