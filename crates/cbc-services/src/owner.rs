//! The owner thread: a dedicated OS thread running a current-thread Tokio
//! runtime that drains the bridge queue into the dispatcher and drives the
//! broadcast state machine's timers.

use std::io;
use std::thread;
use std::time::Instant;

use tokio::runtime::Builder;
use tokio::sync::oneshot;

use cbc_core::config::BridgeConfig;

use crate::bridge::{Bridge, OpReceiver};
use crate::dispatcher::Dispatcher;
use crate::fsm::BroadcastFsm;
use crate::state::CbcState;

const OWNER_THREAD_NAME: &str = "cbc-owner";

/// Handle to a running owner thread.
pub struct OwnerHandle {
    bridge: Bridge,
    shutdown: oneshot::Sender<()>,
    thread: thread::JoinHandle<CbcState>,
}

impl OwnerHandle {
    /// A requester handle feeding this owner.
    pub fn bridge(&self) -> Bridge {
        self.bridge.clone()
    }

    /// Close the queue, apply what is already queued, and stop. Returns the
    /// final state, or `None` if the owner thread panicked.
    pub fn shutdown(self) -> Option<CbcState> {
        let _ = self.shutdown.send(());
        self.thread.join().ok()
    }
}

/// Start the owner thread with `state` and `fsm` moved onto it.
pub fn spawn_owner<F>(state: CbcState, fsm: F, config: &BridgeConfig) -> io::Result<OwnerHandle>
where
    F: BroadcastFsm + 'static,
{
    let (bridge, rx) = Bridge::new(config);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let dispatcher = Dispatcher::new(state, fsm);

    let thread = thread::Builder::new()
        .name(OWNER_THREAD_NAME.to_string())
        .spawn(move || runtime.block_on(run_owner_loop(dispatcher, rx, shutdown_rx)))?;

    Ok(OwnerHandle {
        bridge,
        shutdown: shutdown_tx,
        thread,
    })
}

async fn run_owner_loop<F: BroadcastFsm>(
    mut dispatcher: Dispatcher<F>,
    mut rx: OpReceiver,
    mut shutdown: oneshot::Receiver<()>,
) -> CbcState {
    tracing::info!("owner thread started");
    let mut closing = false;
    loop {
        let deadline = dispatcher.next_deadline();
        tokio::select! {
            biased;
            // a dropped OwnerHandle counts as shutdown too
            _ = &mut shutdown, if !closing => {
                closing = true;
                rx.close();
                tracing::info!("owner queue closed, draining");
            }
            op = rx.recv() => match op {
                Some(op) => dispatcher.handle(op),
                None => break,
            },
            _ = sleep_until(deadline) => dispatcher.tick(Instant::now()),
        }
    }
    tracing::info!(
        messages = dispatcher.state().messages.len(),
        peers = dispatcher.state().peers.len(),
        "owner thread stopped"
    );
    dispatcher.into_state()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d.into()).await,
        None => std::future::pending().await,
    }
}
