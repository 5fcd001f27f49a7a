//! Cross-thread operation bridge.
//!
//! A requester (typically a REST handler on a blocking thread) wraps a
//! request in an [`Operation`], enqueues it for the owner thread and blocks
//! until the owner signals completion or the timeout elapses.
//!
//! The operation's state lives in an `Arc` shared by exactly two holders:
//! the requester's [`Operation`] and the owner's [`PendingOp`]. Whichever
//! side finishes last frees it, so a requester that gave up waiting never
//! leaves the owner writing into freed memory. Under the slot lock the owner
//! checks whether the requester has abandoned the operation and, if so,
//! applies it but skips the signal.
//!
//! Lifecycle: `Constructed → Enqueued → (Completed | Abandoned)`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use cbc_core::config::{BridgeConfig, CbcConfig, PeerConfig};
use cbc_core::{CbcMessage, PeerId, UnknownPeerPolicy};

use crate::fsm::{HandoffError, PeerAck};
use crate::listing::{CbsRow, EtwsRow, PeerRow};
use crate::peer_registry::Contact;

// ── Requests and outcomes ─────────────────────────────────────────────────────

/// Work the owner thread performs on behalf of a requester.
#[derive(Debug, Clone, PartialEq)]
pub enum OpRequest {
    CreateMessage(Box<CbcMessage>),
    DeleteMessage { message_id: u16 },
    ListPeers,
    ListMessages,
    /// Inbound CBSP connection from `host:port`.
    PeerContact { host: String, port: u16 },
    /// The session for `peer` is registered and can take commands.
    PeerSessionUp { peer: PeerId },
    /// The last session for `peer` closed.
    PeerSessionDown { peer: PeerId },
    AddPeer(PeerConfig),
    RemovePeer { name: String },
    SetUnknownPeers(UnknownPeerPolicy),
    RunningConfig,
    /// Live peers and policy merged into the given base document.
    ConfigSnapshot(Box<CbcConfig>),
    PeerAck { peer: PeerId, message_id: u16, ack: PeerAck },
}

impl OpRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            OpRequest::CreateMessage(_) => "create",
            OpRequest::DeleteMessage { .. } => "delete",
            OpRequest::ListPeers => "list_peers",
            OpRequest::ListMessages => "list_messages",
            OpRequest::PeerContact { .. } => "peer_contact",
            OpRequest::PeerSessionUp { .. } => "session_up",
            OpRequest::PeerSessionDown { .. } => "session_down",
            OpRequest::AddPeer(_) => "add_peer",
            OpRequest::RemovePeer { .. } => "remove_peer",
            OpRequest::SetUnknownPeers(_) => "set_unknown_peers",
            OpRequest::RunningConfig => "running_config",
            OpRequest::ConfigSnapshot(_) => "config_snapshot",
            OpRequest::PeerAck { .. } => "peer_ack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// An active message with the same id was overwritten.
    pub replaced: bool,
    /// The state machine could not hand the message to every peer. The
    /// message stays in the registry regardless.
    pub handoff: Option<HandoffError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    Created(Created),
    /// Delete is idempotent; `existed` tells whether anything was removed.
    Deleted { existed: bool },
    Peers(Vec<PeerRow>),
    Messages { cbs: Vec<CbsRow>, etws: Vec<EtwsRow> },
    Contact(Contact),
    SessionUp,
    /// `removed` is set when the peer was admitted dynamically and is gone.
    SessionDown { removed: bool },
    PeerAdded(PeerId),
    PeerRemoved { existed: bool },
    PolicySet,
    RunningConfig(String),
    ConfigSnapshot(Box<CbcConfig>),
    AckApplied,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueFailure {
    QueueFull,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("owner queue rejected operation: {0:?}")]
    EnqueueFailed(EnqueueFailure),
    #[error("no completion within {0:?}; the operation may still be applied")]
    Timeout(Duration),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

// ── Shared operation state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Enqueued,
    Completed,
    Abandoned,
}

struct OpSlot {
    request: Option<OpRequest>,
    phase: Phase,
    result: Option<Result<OpOutcome, BridgeError>>,
}

struct OpShared {
    slot: Mutex<OpSlot>,
    signal: Condvar,
}

impl OpShared {
    /// A poisoned lock means a panic on the other side; the slot data is
    /// still consistent because every critical section is a few assignments.
    fn lock(&self) -> MutexGuard<'_, OpSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Requester side of one operation.
pub struct Operation {
    shared: Arc<OpShared>,
}

impl Operation {
    /// Fresh operation owned by the caller. No side effects.
    pub fn allocate(request: OpRequest) -> Self {
        Self {
            shared: Arc::new(OpShared {
                slot: Mutex::new(OpSlot {
                    request: Some(request),
                    phase: Phase::Constructed,
                    result: None,
                }),
                signal: Condvar::new(),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }
}

/// Counters shared by every clone of a [`Bridge`] and its queue.
#[derive(Debug, Default)]
pub struct BridgeCounters {
    /// Completions delivered to a waiting requester.
    pub signaled: AtomicU64,
    /// Requests whose requester timed out.
    pub abandoned: AtomicU64,
    /// Operations applied after their requester had already given up.
    pub completed_after_abandon: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub signaled: u64,
    pub abandoned: u64,
    pub completed_after_abandon: u64,
}

impl BridgeCounters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            signaled: self.signaled.load(Ordering::Acquire),
            abandoned: self.abandoned.load(Ordering::Acquire),
            completed_after_abandon: self.completed_after_abandon.load(Ordering::Acquire),
        }
    }
}

/// Owner side of one operation, as it travels through the queue.
pub struct PendingOp {
    shared: Arc<OpShared>,
    counters: Arc<BridgeCounters>,
}

impl PendingOp {
    /// Move the payload out. `None` if it was already taken.
    pub fn take_request(&self) -> Option<OpRequest> {
        self.shared.lock().request.take()
    }

    /// Signal the requester. Must be the only completion of this operation.
    pub fn complete(self, result: Result<OpOutcome, BridgeError>) {
        self.finish(result);
    }

    fn finish(&self, result: Result<OpOutcome, BridgeError>) {
        let mut slot = self.shared.lock();
        match slot.phase {
            Phase::Enqueued => {
                slot.result = Some(result);
                slot.phase = Phase::Completed;
                self.counters.signaled.fetch_add(1, Ordering::AcqRel);
                self.shared.signal.notify_one();
            }
            Phase::Abandoned => {
                self.counters
                    .completed_after_abandon
                    .fetch_add(1, Ordering::AcqRel);
                tracing::warn!(ok = result.is_ok(), "operation completed after requester timed out");
            }
            phase @ (Phase::Constructed | Phase::Completed) => {
                tracing::error!(?phase, "operation signaled twice or never enqueued");
                debug_assert!(false, "operation signaled in phase {phase:?}");
            }
        }
    }
}

impl Drop for PendingOp {
    /// An operation dropped without completion (owner torn down mid-drain)
    /// still wakes its requester.
    fn drop(&mut self) {
        let pending = {
            let slot = self.shared.lock();
            slot.phase == Phase::Enqueued
        };
        if pending {
            self.finish(Err(BridgeError::EnqueueFailed(EnqueueFailure::ShuttingDown)));
        }
    }
}

/// Receiving end, owned by the owner thread.
pub type OpReceiver = mpsc::Receiver<PendingOp>;

// ── Bridge ────────────────────────────────────────────────────────────────────

/// Requester handle. Cheap to clone; every clone feeds the same owner queue.
#[derive(Clone)]
pub struct Bridge {
    tx: mpsc::Sender<PendingOp>,
    counters: Arc<BridgeCounters>,
    timeout: Duration,
}

impl Bridge {
    /// Bounded queue of `config.queue_capacity` operations.
    pub fn new(config: &BridgeConfig) -> (Self, OpReceiver) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let bridge = Self {
            tx,
            counters: Arc::new(BridgeCounters::default()),
            timeout: Duration::from_secs(config.op_timeout_secs),
        };
        (bridge, rx)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Enqueue `op` and block until the owner completes it or `timeout`
    /// elapses.
    ///
    /// On `EnqueueFailed` nothing reached the owner and `op` is back in its
    /// constructed state, so the caller may retry it. After any other return
    /// the operation is spent.
    pub fn send_and_wait(
        &self,
        op: &mut Operation,
        timeout: Duration,
    ) -> Result<OpOutcome, BridgeError> {
        // a timeout past the end of the clock waits without a deadline
        let deadline = Instant::now().checked_add(timeout);
        {
            let mut slot = op.shared.lock();
            if slot.phase != Phase::Constructed {
                return Err(BridgeError::InvalidOperation(format!(
                    "operation already submitted ({:?})",
                    slot.phase
                )));
            }
            slot.phase = Phase::Enqueued;
        }

        let pending = PendingOp {
            shared: Arc::clone(&op.shared),
            counters: Arc::clone(&self.counters),
        };
        if let Err(e) = self.tx.try_send(pending) {
            let (failure, pending) = match e {
                mpsc::error::TrySendError::Full(p) => (EnqueueFailure::QueueFull, p),
                mpsc::error::TrySendError::Closed(p) => (EnqueueFailure::ShuttingDown, p),
            };
            // back to Constructed before the returned PendingOp drops, so its
            // Drop does not signal
            op.shared.lock().phase = Phase::Constructed;
            drop(pending);
            return Err(BridgeError::EnqueueFailed(failure));
        }

        let mut slot = op.shared.lock();
        loop {
            if slot.phase == Phase::Completed {
                return slot.result.take().unwrap_or_else(|| {
                    Err(BridgeError::InvalidOperation("result already consumed".into()))
                });
            }
            // spurious wakeups loop back to the phase check
            slot = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        slot.phase = Phase::Abandoned;
                        self.counters.abandoned.fetch_add(1, Ordering::AcqRel);
                        return Err(BridgeError::Timeout(timeout));
                    }
                    op.shared
                        .signal
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => op
                    .shared
                    .signal
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Allocate, send and wait with the bridge's default timeout.
    pub fn call(&self, request: OpRequest) -> Result<OpOutcome, BridgeError> {
        let kind = request.kind();
        let mut op = Operation::allocate(request);
        let result = self.send_and_wait(&mut op, self.timeout);
        if let Err(e) = &result {
            tracing::debug!(op = kind, error = %e, "bridge call failed");
        }
        result
    }

    // ── Typed helpers ─────────────────────────────────────────────────────────

    pub fn create_message(&self, message: CbcMessage) -> Result<Created, BridgeError> {
        match self.call(OpRequest::CreateMessage(Box::new(message)))? {
            OpOutcome::Created(created) => Ok(created),
            other => Err(unexpected(other)),
        }
    }

    /// Returns whether the message existed.
    pub fn delete_message(&self, message_id: u16) -> Result<bool, BridgeError> {
        match self.call(OpRequest::DeleteMessage { message_id })? {
            OpOutcome::Deleted { existed } => Ok(existed),
            other => Err(unexpected(other)),
        }
    }

    pub fn list_peers(&self) -> Result<Vec<PeerRow>, BridgeError> {
        match self.call(OpRequest::ListPeers)? {
            OpOutcome::Peers(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    pub fn list_messages(&self) -> Result<(Vec<CbsRow>, Vec<EtwsRow>), BridgeError> {
        match self.call(OpRequest::ListMessages)? {
            OpOutcome::Messages { cbs, etws } => Ok((cbs, etws)),
            other => Err(unexpected(other)),
        }
    }

    pub fn peer_contact(&self, host: &str, port: u16) -> Result<Contact, BridgeError> {
        let request = OpRequest::PeerContact {
            host: host.to_string(),
            port,
        };
        match self.call(request)? {
            OpOutcome::Contact(contact) => Ok(contact),
            other => Err(unexpected(other)),
        }
    }

    pub fn session_up(&self, peer: PeerId) -> Result<(), BridgeError> {
        match self.call(OpRequest::PeerSessionUp { peer })? {
            OpOutcome::SessionUp => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Returns whether the peer was dropped from the registry.
    pub fn session_down(&self, peer: PeerId) -> Result<bool, BridgeError> {
        match self.call(OpRequest::PeerSessionDown { peer })? {
            OpOutcome::SessionDown { removed } => Ok(removed),
            other => Err(unexpected(other)),
        }
    }

    pub fn add_peer(&self, peer: PeerConfig) -> Result<PeerId, BridgeError> {
        match self.call(OpRequest::AddPeer(peer))? {
            OpOutcome::PeerAdded(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub fn remove_peer(&self, name: &str) -> Result<bool, BridgeError> {
        let request = OpRequest::RemovePeer {
            name: name.to_string(),
        };
        match self.call(request)? {
            OpOutcome::PeerRemoved { existed } => Ok(existed),
            other => Err(unexpected(other)),
        }
    }

    pub fn set_unknown_peers(&self, policy: UnknownPeerPolicy) -> Result<(), BridgeError> {
        match self.call(OpRequest::SetUnknownPeers(policy))? {
            OpOutcome::PolicySet => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn running_config(&self) -> Result<String, BridgeError> {
        match self.call(OpRequest::RunningConfig)? {
            OpOutcome::RunningConfig(text) => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    pub fn config_snapshot(&self, base: CbcConfig) -> Result<CbcConfig, BridgeError> {
        match self.call(OpRequest::ConfigSnapshot(Box::new(base)))? {
            OpOutcome::ConfigSnapshot(config) => Ok(*config),
            other => Err(unexpected(other)),
        }
    }

    pub fn peer_ack(&self, peer: PeerId, message_id: u16, ack: PeerAck) -> Result<(), BridgeError> {
        match self.call(OpRequest::PeerAck { peer, message_id, ack })? {
            OpOutcome::AckApplied => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(outcome: OpOutcome) -> BridgeError {
    BridgeError::InvalidOperation(format!("unexpected outcome {outcome:?}"))
}
