use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use cbc_core::config::BridgeConfig;
use cbc_core::{CbcMessage, PeerId, UnknownPeerPolicy};
use cbc_services::bridge::{BridgeError, EnqueueFailure, OpOutcome, OpRequest, Operation};
use cbc_services::fsm::{BroadcastFsm, HandoffError, PeerAck};
use cbc_services::peer_registry::PeerRegistry;
use cbc_services::{spawn_owner, CbcState};

use crate::*;

/// State machine that stalls the owner thread on every create.
struct SlowFsm {
    delay: Duration,
}

impl BroadcastFsm for SlowFsm {
    fn on_create(&mut self, _: &CbcMessage, _: &[PeerId], _: Instant) -> Result<(), HandoffError> {
        thread::sleep(self.delay);
        Ok(())
    }
    fn on_delete(&mut self, _: u16, _: Instant) {}
    fn on_peer_connected(&mut self, _: PeerId, _: Instant) {}
    fn on_peer_removed(&mut self, _: PeerId) {}
    fn on_peer_ack(&mut self, _: PeerId, _: u16, _: PeerAck, _: Instant) {}
    fn poll_expired(&mut self, _: Instant) -> Vec<u16> {
        Vec::new()
    }
    fn next_deadline(&self) -> Option<Instant> {
        None
    }
}

#[test]
fn concurrent_operations_are_each_signaled_once() {
    const THREADS: usize = 32;
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let bridge = owner.bridge();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut op = Operation::allocate(OpRequest::CreateMessage(Box::new(
                    cbs_message(i as u16, 1, 1, 0x0f),
                )));
                barrier.wait();
                // the queue holds 10; a full queue hands the op back for retry
                loop {
                    match bridge.send_and_wait(&mut op, Duration::from_secs(10)) {
                        Err(BridgeError::EnqueueFailed(EnqueueFailure::QueueFull)) => {
                            thread::sleep(Duration::from_millis(1));
                        }
                        other => return other,
                    }
                }
            })
        })
        .collect();

    for h in handles {
        let outcome = h.join().expect("requester thread panicked");
        assert!(matches!(outcome, Ok(OpOutcome::Created(_))), "got {outcome:?}");
    }

    let bridge = owner.bridge();
    assert_eq!(bridge.counters().signaled, THREADS as u64);
    assert_eq!(bridge.counters().abandoned, 0);
    let (cbs, _) = bridge.list_messages().unwrap();
    assert_eq!(cbs.len(), THREADS);
    owner.shutdown().unwrap();
}

#[test]
fn create_then_delete_from_one_thread_is_ordered() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();

    bridge.create_message(cbs_message(5, 1, 1, 0x0f)).unwrap();
    assert!(bridge.delete_message(5).unwrap());

    let state = owner.shutdown().unwrap();
    assert!(!state.messages.contains(5));
}

#[test]
fn timed_out_create_still_applies_once() {
    let slow = spawn_owner(
        CbcState::new(PeerRegistry::new(UnknownPeerPolicy::Reject)),
        SlowFsm {
            delay: Duration::from_millis(300),
        },
        &BridgeConfig::default(),
    )
    .unwrap();
    let impatient = slow.bridge().with_timeout(Duration::from_millis(20));

    let err = impatient.create_message(cbs_message(7, 3, 2, 0x0f)).unwrap_err();
    assert_eq!(err, BridgeError::Timeout(Duration::from_millis(20)));

    // FIFO: the listing runs after the abandoned create completes
    let (slow_cbs, slow_etws) = slow.bridge().list_messages().unwrap();
    let counters = slow.bridge().counters();
    assert_eq!(counters.abandoned, 1);
    assert_eq!(counters.completed_after_abandon, 1);

    let fast = spawn_cbc(UnknownPeerPolicy::Reject);
    fast.bridge().create_message(cbs_message(7, 3, 2, 0x0f)).unwrap();
    let (fast_cbs, fast_etws) = fast.bridge().list_messages().unwrap();

    assert_eq!(slow_cbs, fast_cbs);
    assert_eq!(slow_etws, fast_etws);
    slow.shutdown().unwrap();
    fast.shutdown().unwrap();
}

#[test]
fn operations_after_shutdown_fail_to_enqueue() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    bridge.create_message(cbs_message(1, 1, 1, 0x0f)).unwrap();

    let state = owner.shutdown().unwrap();
    assert_eq!(state.messages.len(), 1);

    let mut op = Operation::allocate(OpRequest::ListPeers);
    assert_eq!(
        bridge.send_and_wait(&mut op, Duration::from_secs(1)).unwrap_err(),
        BridgeError::EnqueueFailed(EnqueueFailure::ShuttingDown)
    );
    // the op was handed back and may be resubmitted
    assert_eq!(
        bridge.send_and_wait(&mut op, Duration::from_secs(1)).unwrap_err(),
        BridgeError::EnqueueFailed(EnqueueFailure::ShuttingDown)
    );
}

#[test]
fn completed_operation_cannot_be_resubmitted() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    let mut op = Operation::allocate(OpRequest::ListPeers);
    bridge.send_and_wait(&mut op, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        bridge.send_and_wait(&mut op, Duration::from_secs(5)),
        Err(BridgeError::InvalidOperation(_))
    ));
    owner.shutdown().unwrap();
}

#[test]
fn warning_period_expiry_runs_without_traffic() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    let mut msg = cbs_message(0x30, 1, 1, 0x0f);
    msg.warning_period_sec = Some(0);
    bridge.create_message(msg).unwrap();

    let gone = wait_until(Duration::from_secs(5), || {
        bridge.list_messages().map(|(cbs, _)| cbs.is_empty()).unwrap_or(false)
    });
    assert!(gone, "message with zero warning period should expire");
    owner.shutdown().unwrap();
}
