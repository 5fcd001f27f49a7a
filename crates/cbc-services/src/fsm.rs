//! Broadcast state machine: per (message, peer) transmission state, ack
//! timers and message expiry.
//!
//! The dispatcher feeds it creates and deletes; it answers with commands on
//! the [`RanLink`] and, from [`BroadcastFsm::poll_expired`], the ids of
//! messages whose warning period is over. Removing those from the registry
//! is the dispatcher's job, so every registry mutation stays on one path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cbc_core::{CbcMessage, PeerId};

use crate::session::{LinkError, RanCommand, RanLink};

/// How long a peer has to acknowledge a WRITE, REPLACE or KILL.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    #[error("message {message_id:#06x} could not be handed to {} peer session(s)", .peers.len())]
    Link { message_id: u16, peers: Vec<PeerId> },
}

/// Acknowledgement (or failure) received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAck {
    Write { success: bool },
    Replace { success: bool },
    Kill { success: bool },
}

/// State of one message at one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Not yet sent; the peer has no session.
    Init,
    WaitWriteAck,
    Active,
    WaitReplaceAck,
    WaitDeleteAck,
    Deleted,
}

pub trait BroadcastFsm: Send {
    /// A message was inserted or replaced in the registry.
    fn on_create(
        &mut self,
        message: &CbcMessage,
        peers: &[PeerId],
        now: Instant,
    ) -> Result<(), HandoffError>;
    /// A message left the registry; withdraw it from every peer.
    fn on_delete(&mut self, message_id: u16, now: Instant);
    fn on_peer_connected(&mut self, peer: PeerId, now: Instant);
    fn on_peer_removed(&mut self, peer: PeerId);
    fn on_peer_ack(&mut self, peer: PeerId, message_id: u16, ack: PeerAck, now: Instant);
    /// Fire due timers. Returns message ids whose warning period elapsed.
    fn poll_expired(&mut self, now: Instant) -> Vec<u16>;
    /// Earliest instant at which `poll_expired` has work to do.
    fn next_deadline(&self) -> Option<Instant>;
}

// ── Per-peer tracking ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct PeerTrack {
    peer: PeerId,
    state: PeerState,
    deadline: Option<Instant>,
}

impl PeerTrack {
    fn wait(&mut self, state: PeerState, now: Instant) {
        self.state = state;
        self.deadline = Some(now + ACK_TIMEOUT);
    }

    fn settle(&mut self, state: PeerState) {
        self.state = state;
        self.deadline = None;
    }
}

#[derive(Debug)]
struct MessageTrack {
    message: Arc<CbcMessage>,
    expires_at: Option<Instant>,
    peers: Vec<PeerTrack>,
}

impl MessageTrack {
    fn peer_mut(&mut self, peer: PeerId) -> Option<&mut PeerTrack> {
        self.peers.iter_mut().find(|t| t.peer == peer)
    }

    fn id(&self) -> u16 {
        self.message.message_id()
    }
}

/// [`BroadcastFsm`] driving every peer through WRITE / REPLACE / KILL.
pub struct PeerBroadcastFsm<L: RanLink> {
    link: L,
    active: Vec<MessageTrack>,
    /// Deleted messages whose KILLs are still outstanding.
    withdrawing: Vec<MessageTrack>,
}

impl<L: RanLink> PeerBroadcastFsm<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            active: Vec::new(),
            withdrawing: Vec::new(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// State of an active message at a peer.
    pub fn peer_state(&self, message_id: u16, peer: PeerId) -> Option<PeerState> {
        self.active
            .iter()
            .chain(self.withdrawing.iter())
            .find(|t| t.id() == message_id)
            .and_then(|t| t.peers.iter().find(|p| p.peer == peer))
            .map(|p| p.state)
    }

    pub fn withdrawing_count(&self) -> usize {
        self.withdrawing.len()
    }

    /// Send a WRITE to one peer. On a missing session the peer stays in
    /// `Init` until it connects.
    fn write(
        link: &mut L,
        message: &Arc<CbcMessage>,
        track: &mut PeerTrack,
        now: Instant,
    ) -> Result<(), LinkError> {
        match link.submit(track.peer, RanCommand::Write(Arc::clone(message))) {
            Ok(()) => {
                track.wait(PeerState::WaitWriteAck, now);
                Ok(())
            }
            Err(LinkError::NotConnected(peer)) => {
                tracing::debug!(%peer, message_id = message.message_id(), "peer not connected, write deferred");
                track.settle(PeerState::Init);
                Ok(())
            }
            Err(e) => {
                track.settle(PeerState::Init);
                Err(e)
            }
        }
    }
}

impl<L: RanLink> BroadcastFsm for PeerBroadcastFsm<L> {
    fn on_create(
        &mut self,
        message: &CbcMessage,
        peers: &[PeerId],
        now: Instant,
    ) -> Result<(), HandoffError> {
        let message_id = message.message_id();
        let message = Arc::new(message.clone());
        let expires_at = message
            .warning_period_sec
            .map(|secs| now + Duration::from_secs(secs as u64));
        let mut failed = Vec::new();

        if let Some(track) = self.active.iter_mut().find(|t| t.id() == message_id) {
            track.message = Arc::clone(&message);
            track.expires_at = expires_at;
            for peer_track in &mut track.peers {
                match peer_track.state {
                    PeerState::Active | PeerState::WaitReplaceAck => {
                        let cmd = RanCommand::Replace(Arc::clone(&message));
                        match self.link.submit(peer_track.peer, cmd) {
                            Ok(()) => peer_track.wait(PeerState::WaitReplaceAck, now),
                            Err(e) => {
                                tracing::warn!(peer = %peer_track.peer, message_id, error = %e, "replace not handed off");
                                failed.push(peer_track.peer);
                            }
                        }
                    }
                    // not yet on air there; the next WRITE carries the new content
                    PeerState::Init => {}
                    PeerState::WaitWriteAck => {
                        if Self::write(&mut self.link, &message, peer_track, now).is_err() {
                            failed.push(peer_track.peer);
                        }
                    }
                    PeerState::WaitDeleteAck | PeerState::Deleted => {}
                }
            }
        } else {
            let mut track = MessageTrack {
                message: Arc::clone(&message),
                expires_at,
                peers: peers
                    .iter()
                    .map(|&peer| PeerTrack {
                        peer,
                        state: PeerState::Init,
                        deadline: None,
                    })
                    .collect(),
            };
            for peer_track in &mut track.peers {
                if let Err(e) = Self::write(&mut self.link, &message, peer_track, now) {
                    tracing::warn!(peer = %peer_track.peer, message_id, error = %e, "write not handed off");
                    failed.push(peer_track.peer);
                }
            }
            self.active.push(track);
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(HandoffError::Link {
                message_id,
                peers: failed,
            })
        }
    }

    fn on_delete(&mut self, message_id: u16, now: Instant) {
        let Some(idx) = self.active.iter().position(|t| t.id() == message_id) else {
            return;
        };
        let mut track = self.active.remove(idx);
        track.expires_at = None;
        let serial_nr = track.message.serial_nr();
        for peer_track in &mut track.peers {
            match peer_track.state {
                PeerState::Init | PeerState::Deleted => peer_track.settle(PeerState::Deleted),
                PeerState::WaitWriteAck
                | PeerState::Active
                | PeerState::WaitReplaceAck
                | PeerState::WaitDeleteAck => {
                    let cmd = RanCommand::Kill { message_id, serial_nr };
                    match self.link.submit(peer_track.peer, cmd) {
                        Ok(()) => peer_track.wait(PeerState::WaitDeleteAck, now),
                        Err(e) => {
                            tracing::warn!(peer = %peer_track.peer, message_id, error = %e, "kill not handed off");
                            peer_track.settle(PeerState::Deleted);
                        }
                    }
                }
            }
        }
        if track.peers.iter().any(|p| p.state != PeerState::Deleted) {
            self.withdrawing.push(track);
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId, now: Instant) {
        for track in &mut self.active {
            if track.peer_mut(peer).is_none() {
                track.peers.push(PeerTrack {
                    peer,
                    state: PeerState::Init,
                    deadline: None,
                });
            }
            let message = Arc::clone(&track.message);
            if let Some(peer_track) = track.peer_mut(peer) {
                if peer_track.state == PeerState::Init {
                    if let Err(e) = Self::write(&mut self.link, &message, peer_track, now) {
                        tracing::warn!(%peer, message_id = message.message_id(), error = %e, "write not handed off");
                    }
                }
            }
        }
    }

    fn on_peer_removed(&mut self, peer: PeerId) {
        for track in self.active.iter_mut().chain(self.withdrawing.iter_mut()) {
            track.peers.retain(|t| t.peer != peer);
        }
        self.withdrawing.retain(|t| !t.peers.is_empty());
        self.link.detach(peer);
    }

    fn on_peer_ack(&mut self, peer: PeerId, message_id: u16, ack: PeerAck, _now: Instant) {
        // a KILL ack belongs to a withdrawal even if the id was re-created since
        let (first, second) = match ack {
            PeerAck::Kill { .. } => (&mut self.withdrawing, &mut self.active),
            _ => (&mut self.active, &mut self.withdrawing),
        };
        let Some(peer_track) = first
            .iter_mut()
            .chain(second.iter_mut())
            .filter(|t| t.id() == message_id)
            .find_map(|t| t.peer_mut(peer))
        else {
            tracing::warn!(%peer, message_id, ?ack, "ack for unknown message");
            return;
        };
        let next = match (peer_track.state, ack) {
            (PeerState::WaitWriteAck, PeerAck::Write { .. }) => PeerState::Active,
            (PeerState::WaitReplaceAck, PeerAck::Replace { .. }) => PeerState::Active,
            (PeerState::WaitDeleteAck, PeerAck::Kill { .. }) => PeerState::Deleted,
            (state, ack) => {
                tracing::warn!(%peer, message_id, ?state, ?ack, "unexpected ack ignored");
                return;
            }
        };
        let success = match ack {
            PeerAck::Write { success } | PeerAck::Replace { success } | PeerAck::Kill { success } => success,
        };
        if !success {
            tracing::warn!(%peer, message_id, ?ack, "peer reported failure");
        }
        peer_track.settle(next);
        self.withdrawing
            .retain(|t| t.peers.iter().any(|p| p.state != PeerState::Deleted));
    }

    fn poll_expired(&mut self, now: Instant) -> Vec<u16> {
        for track in self.active.iter_mut().chain(self.withdrawing.iter_mut()) {
            let message_id = track.message.message_id();
            for peer_track in &mut track.peers {
                if peer_track.deadline.is_some_and(|d| d <= now) {
                    let next = match peer_track.state {
                        PeerState::WaitDeleteAck => PeerState::Deleted,
                        _ => PeerState::Active,
                    };
                    tracing::warn!(peer = %peer_track.peer, message_id, state = ?peer_track.state, "no ack from peer");
                    peer_track.settle(next);
                }
            }
        }
        self.withdrawing
            .retain(|t| t.peers.iter().any(|p| p.state != PeerState::Deleted));

        let mut expired = Vec::new();
        for track in &mut self.active {
            if track.expires_at.is_some_and(|e| e <= now) {
                track.expires_at = None;
                expired.push(track.id());
            }
        }
        expired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.active
            .iter()
            .chain(self.withdrawing.iter())
            .flat_map(|t| t.peers.iter().filter_map(|p| p.deadline).chain(t.expires_at))
            .min()
    }
}
