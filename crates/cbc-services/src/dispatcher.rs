//! Registry dispatcher: the only code that mutates [`CbcState`].
//!
//! Runs on the owner thread. Every dequeued operation is applied and then
//! completed exactly once, including malformed ones.

use std::time::Instant;

use cbc_core::CbcMessage;

use crate::bridge::{BridgeError, Created, OpOutcome, OpRequest, PendingOp};
use crate::fsm::BroadcastFsm;
use crate::listing;
use crate::message_registry::Upsert;
use crate::peer_registry::Contact;
use crate::running_config::render_running_config;
use crate::state::CbcState;

pub struct Dispatcher<F: BroadcastFsm> {
    state: CbcState,
    fsm: F,
}

impl<F: BroadcastFsm> Dispatcher<F> {
    pub fn new(state: CbcState, fsm: F) -> Self {
        Self { state, fsm }
    }

    pub fn state(&self) -> &CbcState {
        &self.state
    }

    pub fn fsm(&self) -> &F {
        &self.fsm
    }

    pub fn into_state(self) -> CbcState {
        self.state
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.fsm.next_deadline()
    }

    /// Apply one queued operation and signal its requester.
    pub fn handle(&mut self, op: PendingOp) {
        let result = match op.take_request() {
            Some(request) => {
                let kind = request.kind();
                let result = self.apply(request, Instant::now());
                match &result {
                    Ok(_) => tracing::debug!(op = kind, "operation applied"),
                    Err(e) => tracing::warn!(op = kind, error = %e, "operation rejected"),
                }
                result
            }
            None => {
                tracing::warn!("operation without payload");
                Err(BridgeError::InvalidOperation("missing payload".into()))
            }
        };
        op.complete(result);
    }

    /// Apply a request directly. Used by [`handle`](Self::handle) and by
    /// tests that drive the dispatcher without a queue.
    pub fn apply(&mut self, request: OpRequest, now: Instant) -> Result<OpOutcome, BridgeError> {
        match request {
            OpRequest::CreateMessage(message) => self.create(*message, now),
            OpRequest::DeleteMessage { message_id } => Ok(self.delete(message_id, now)),
            OpRequest::ListPeers => Ok(OpOutcome::Peers(listing::peer_rows(&self.state))),
            OpRequest::ListMessages => Ok(OpOutcome::Messages {
                cbs: listing::cbs_rows(&self.state),
                etws: listing::etws_rows(&self.state),
            }),
            OpRequest::PeerContact { host, port } => {
                let contact = self.state.peers.contact(&host, port);
                match contact {
                    Contact::Known(peer) => tracing::info!(%peer, %host, port, "known peer connected"),
                    Contact::Accepted(peer) => {
                        tracing::info!(%peer, %host, port, "unknown peer accepted")
                    }
                    Contact::Rejected => tracing::warn!(%host, port, "unknown peer rejected"),
                }
                Ok(OpOutcome::Contact(contact))
            }
            OpRequest::PeerSessionUp { peer } => {
                if self.state.peers.by_id(peer).is_none() {
                    return Err(BridgeError::InvalidOperation(format!("{peer} is not registered")));
                }
                self.fsm.on_peer_connected(peer, now);
                Ok(OpOutcome::SessionUp)
            }
            OpRequest::PeerSessionDown { peer } => {
                // peers admitted under the accept policy live as long as their session
                let dynamic = self
                    .state
                    .peers
                    .by_id(peer)
                    .is_some_and(|p| p.name.is_none());
                if dynamic {
                    self.state.peers.remove_by_id(peer);
                    self.fsm.on_peer_removed(peer);
                    tracing::info!(%peer, "unknown peer disconnected, removed");
                }
                Ok(OpOutcome::SessionDown { removed: dynamic })
            }
            OpRequest::AddPeer(config) => {
                let id = self
                    .state
                    .peers
                    .add(&config)
                    .map_err(|e| BridgeError::InvalidOperation(e.to_string()))?;
                tracing::info!(peer = %config.name, "peer added");
                Ok(OpOutcome::PeerAdded(id))
            }
            OpRequest::RemovePeer { name } => {
                let removed = self.state.peers.remove(&name);
                if let Some(peer) = &removed {
                    self.fsm.on_peer_removed(peer.id);
                    tracing::info!(peer = %name, "peer removed");
                }
                Ok(OpOutcome::PeerRemoved {
                    existed: removed.is_some(),
                })
            }
            OpRequest::SetUnknownPeers(policy) => {
                self.state.peers.set_policy(policy);
                tracing::info!(%policy, "unknown-peers policy set");
                Ok(OpOutcome::PolicySet)
            }
            OpRequest::RunningConfig => Ok(OpOutcome::RunningConfig(render_running_config(
                &self.state.peers,
            ))),
            OpRequest::ConfigSnapshot(base) => Ok(OpOutcome::ConfigSnapshot(Box::new(
                self.state.to_config(&base),
            ))),
            OpRequest::PeerAck {
                peer,
                message_id,
                ack,
            } => {
                self.fsm.on_peer_ack(peer, message_id, ack, now);
                Ok(OpOutcome::AckApplied)
            }
        }
    }

    fn create(&mut self, message: CbcMessage, now: Instant) -> Result<OpOutcome, BridgeError> {
        message
            .validate()
            .map_err(|e| BridgeError::InvalidOperation(e.to_string()))?;

        let message_id = message.message_id();
        let peers = self.state.peers.ids();
        let replaced = match self.state.messages.upsert(message) {
            Upsert::Inserted => false,
            Upsert::Replaced(old) => {
                tracing::info!(message_id, old_serial_nr = old.serial_nr(), "message replaced in place");
                true
            }
        };

        let handoff = self
            .state
            .messages
            .by_id(message_id)
            .map(|m| self.fsm.on_create(m, &peers, now))
            .and_then(Result::err);
        if let Some(e) = &handoff {
            tracing::warn!(message_id, error = %e, "hand-off incomplete, message kept");
        }
        Ok(OpOutcome::Created(Created { replaced, handoff }))
    }

    fn delete(&mut self, message_id: u16, now: Instant) -> OpOutcome {
        match self.state.messages.remove(message_id) {
            Some(_) => {
                self.fsm.on_delete(message_id, now);
                tracing::info!(message_id, "message deleted");
                OpOutcome::Deleted { existed: true }
            }
            None => {
                tracing::debug!(message_id, "delete of unknown message");
                OpOutcome::Deleted { existed: false }
            }
        }
    }

    /// Fire state machine timers; expired messages leave the registry the
    /// same way a delete does.
    pub fn tick(&mut self, now: Instant) {
        for message_id in self.fsm.poll_expired(now) {
            if self.state.messages.remove(message_id).is_some() {
                tracing::info!(message_id, "warning period over, message expired");
                self.fsm.on_delete(message_id, now);
            }
        }
    }
}
