//! CBC integration test harness.
//!
//! Everything runs in-process: an owner thread per test, fed through the
//! bridge directly or through the REST API on a loopback port.
//!
//!   cargo test --test integration

mod api;
mod bridge;
mod registry;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use cbc_core::config::BridgeConfig;
use cbc_core::{
    Category, CbcMessage, CbsPayload, EtwsPayload, Scope, SmscbMessage, SmscbPayload,
    UnknownPeerPolicy,
};
use cbc_services::fsm::PeerBroadcastFsm;
use cbc_services::peer_registry::PeerRegistry;
use cbc_services::session::{new_session_table, SessionLink};
use cbc_services::{spawn_owner, CbcState, OwnerHandle};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Owner thread with an empty registry and the real state machine.
pub fn spawn_cbc(policy: UnknownPeerPolicy) -> OwnerHandle {
    spawn_owner(
        CbcState::new(PeerRegistry::new(policy)),
        PeerBroadcastFsm::new(SessionLink::new(new_session_table())),
        &BridgeConfig::default(),
    )
    .expect("owner thread should start")
}

pub fn cbs_message(message_id: u16, serial_nr: u16, rep_period: u16, dcs: u8) -> CbcMessage {
    CbcMessage {
        cbe_name: "it-cbe".into(),
        category: Category::Normal,
        rep_period,
        extended_cbch: false,
        warning_period_sec: None,
        num_bcast: 0,
        scope: Scope::Plmn,
        msg: SmscbMessage {
            message_id,
            serial_nr,
            payload: SmscbPayload::Cbs(CbsPayload {
                dcs,
                pages: vec![vec![0x41; 82]],
            }),
        },
    }
}

pub fn etws_message(message_id: u16, serial_nr: u16) -> CbcMessage {
    CbcMessage {
        msg: SmscbMessage {
            message_id,
            serial_nr,
            payload: SmscbPayload::Etws(EtwsPayload {
                warning_type: 1,
                warning_sec_info: vec![],
            }),
        },
        ..cbs_message(message_id, serial_nr, 1, 0)
    }
}

/// Fresh per-test scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cbc-it-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// Poll `check` until it returns true or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}
