//! RAN session table and the link the broadcast FSM talks through.
//!
//! Each connected peer has one session task owning its TCP stream. The owner
//! thread reaches it only through an unbounded channel, so handing off a
//! command never blocks the dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;

use cbc_core::{CbcMessage, PeerId};

/// A command for one peer's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RanCommand {
    /// New message (CBSP WRITE-REPLACE without old serial number).
    Write(Arc<CbcMessage>),
    /// Updated content for a message the peer already broadcasts.
    Replace(Arc<CbcMessage>),
    Kill { message_id: u16, serial_nr: u16 },
}

impl RanCommand {
    pub fn message_id(&self) -> u16 {
        match self {
            RanCommand::Write(m) | RanCommand::Replace(m) => m.message_id(),
            RanCommand::Kill { message_id, .. } => *message_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RanCommand::Write(_) => "write",
            RanCommand::Replace(_) => "replace",
            RanCommand::Kill { .. } => "kill",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("{0} has no session")]
    NotConnected(PeerId),
    #[error("session of {0} is closing")]
    Closed(PeerId),
}

/// Non-blocking hand-off of commands to per-peer sessions.
pub trait RanLink: Send {
    fn submit(&mut self, peer: PeerId, cmd: RanCommand) -> Result<(), LinkError>;
    /// Drop the peer's session, if any.
    fn detach(&mut self, peer: PeerId);
}

/// Sender half plus metadata for one live session.
#[derive(Debug)]
pub struct SessionHandle {
    pub tx: mpsc::UnboundedSender<RanCommand>,
    pub remote: SocketAddr,
    pub established_at: Instant,
}

/// The session table, shared between the accept loop, session tasks and the
/// owner thread.
pub type SessionTable = Arc<DashMap<PeerId, SessionHandle>>;

/// Create a new empty session table.
pub fn new_session_table() -> SessionTable {
    Arc::new(DashMap::new())
}

/// [`RanLink`] over the session table.
#[derive(Clone)]
pub struct SessionLink {
    sessions: SessionTable,
}

impl SessionLink {
    pub fn new(sessions: SessionTable) -> Self {
        Self { sessions }
    }
}

impl RanLink for SessionLink {
    fn submit(&mut self, peer: PeerId, cmd: RanCommand) -> Result<(), LinkError> {
        let Some(session) = self.sessions.get(&peer) else {
            return Err(LinkError::NotConnected(peer));
        };
        session.tx.send(cmd).map_err(|_| LinkError::Closed(peer))
    }

    fn detach(&mut self, peer: PeerId) {
        if let Some((_, session)) = self.sessions.remove(&peer) {
            tracing::info!(%peer, remote = %session.remote, "session detached");
        }
    }
}
