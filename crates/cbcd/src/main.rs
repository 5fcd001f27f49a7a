//! cbcd: Cell Broadcast Centre daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use cbc_core::config::CbcConfig;
use cbc_services::fsm::PeerBroadcastFsm;
use cbc_services::session::{new_session_table, SessionLink};
use cbc_services::{spawn_owner, CbcState};

mod cbsp;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CbcConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config_path = CbcConfig::file_path();
    let config = CbcConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CbcConfig::default()
    });
    tracing::info!(
        path = %config_path.display(),
        peers = config.peers.len(),
        unknown_peers = %config.cbc.unknown_peers,
        "cbcd starting"
    );

    // Owner thread
    let state = CbcState::from_config(&config).context("invalid peer configuration")?;
    let sessions = new_session_table();
    let fsm = PeerBroadcastFsm::new(SessionLink::new(sessions.clone()));
    let owner = spawn_owner(state, fsm, &config.bridge).context("failed to start owner thread")?;
    let bridge = owner.bridge();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let bind_addr = config.network.bind_addr.clone();
    let cbsp_socket = TcpListener::bind((bind_addr.as_str(), config.network.cbsp_port))
        .await
        .context("failed to bind CBSP listener")?;
    tracing::info!(addr = %cbsp_socket.local_addr()?, "CBSP listening");

    let cbsp_task = tokio::spawn(
        cbsp::CbspListener::new(
            cbsp_socket,
            bridge.clone(),
            sessions.clone(),
            shutdown_tx.clone(),
        )
        .run(),
    );

    let api_task = {
        let state = cbc_api::ApiState {
            bridge: bridge.clone(),
            sessions: sessions.clone(),
            base_config: Arc::new(config.clone()),
            config_path,
        };
        let port = config.network.api_port;
        tokio::spawn(async move { cbc_api::serve(state, &bind_addr, port).await })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = cbsp_task          => tracing::error!("CBSP listener exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
    }
    let _ = shutdown_tx.send(());

    // Joining the owner blocks until the queue is drained.
    let final_state = tokio::task::spawn_blocking(move || owner.shutdown())
        .await
        .context("owner join task failed")?;
    match final_state {
        Some(state) => tracing::info!(
            messages = state.messages.len(),
            peers = state.peers.len(),
            "owner stopped"
        ),
        None => tracing::error!("owner thread panicked"),
    }

    Ok(())
}
