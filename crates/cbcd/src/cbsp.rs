//! CBSP accept loop and per-connection session tasks.
//!
//! Every inbound connection is classified by the owner thread (known peer,
//! accepted unknown peer, or rejected) before a session is registered. Once
//! registered, the session drains the [`RanCommand`]s the broadcast state
//! machine addresses to its peer.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use cbc_core::PeerId;
use cbc_services::peer_registry::Contact;
use cbc_services::session::{RanCommand, SessionHandle, SessionTable};
use cbc_services::Bridge;

pub struct CbspListener {
    listener: TcpListener,
    bridge: Bridge,
    sessions: SessionTable,
    shutdown_tx: broadcast::Sender<()>,
}

impl CbspListener {
    pub fn new(
        listener: TcpListener,
        bridge: Bridge,
        sessions: SessionTable,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            listener,
            bridge,
            sessions,
            shutdown_tx,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("CBSP listener shutting down");
                    return Ok(());
                }

                result = self.listener.accept() => {
                    let (stream, remote) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tokio::spawn(handle_connection(
                        stream,
                        remote,
                        self.bridge.clone(),
                        self.sessions.clone(),
                        self.shutdown_tx.subscribe(),
                    ));
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    bridge: Bridge,
    sessions: SessionTable,
    shutdown: broadcast::Receiver<()>,
) {
    let contact = {
        let bridge = bridge.clone();
        let host = remote.ip().to_string();
        tokio::task::spawn_blocking(move || bridge.peer_contact(&host, remote.port())).await
    };
    let peer = match contact {
        Ok(Ok(Contact::Known(peer) | Contact::Accepted(peer))) => peer,
        Ok(Ok(Contact::Rejected)) => {
            tracing::warn!(%remote, "dropping connection from unknown peer");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(%remote, error = %e, "peer lookup failed, dropping connection");
            return;
        }
        Err(e) => {
            tracing::error!(%remote, error = %e, "peer lookup task failed");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let established_at = Instant::now();
    let previous = sessions.insert(
        peer,
        SessionHandle {
            tx,
            remote,
            established_at,
        },
    );
    if let Some(old) = previous {
        tracing::info!(%peer, old_remote = %old.remote, "replacing existing session");
    }
    tracing::info!(%peer, %remote, "CBSP session established");

    // Let the state machine push pending messages to the new session.
    let up = {
        let bridge = bridge.clone();
        tokio::task::spawn_blocking(move || bridge.session_up(peer)).await
    };
    match up {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(%peer, error = %e, "session_up not applied"),
        Err(e) => tracing::error!(%peer, error = %e, "session_up task failed"),
    }

    run_session(stream, peer, rx, shutdown).await;

    // A newer connection for the same peer may have replaced this entry.
    let removed = sessions
        .remove_if(&peer, |_, h| h.remote == remote && h.established_at == established_at)
        .is_some();
    tracing::info!(%peer, %remote, removed, "CBSP session closed");
    if !removed {
        return;
    }

    let down = {
        let bridge = bridge.clone();
        tokio::task::spawn_blocking(move || bridge.session_down(peer)).await
    };
    match down {
        Ok(Ok(forgotten)) => tracing::debug!(%peer, forgotten, "session_down applied"),
        Ok(Err(e)) => tracing::warn!(%peer, error = %e, "session_down not applied"),
        Err(e) => tracing::error!(%peer, error = %e, "session_down task failed"),
    }
}

/// Drain commands until the peer disconnects, the session is detached, or the
/// daemon shuts down. CBSP framing is outside this daemon, so commands are
/// logged and inbound bytes are discarded.
async fn run_session(
    mut stream: TcpStream,
    peer: PeerId,
    mut commands: mpsc::UnboundedReceiver<RanCommand>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,

            cmd = commands.recv() => match cmd {
                Some(cmd) => tracing::info!(
                    %peer,
                    kind = cmd.kind(),
                    message_id = cmd.message_id(),
                    "RAN command"
                ),
                None => {
                    tracing::info!(%peer, "session detached");
                    return;
                }
            },

            read = stream.read(&mut buf) => match read {
                Ok(0) => return,
                Ok(n) => tracing::debug!(%peer, bytes = n, "inbound CBSP data"),
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "CBSP read failed");
                    return;
                }
            },
        }
    }
}
