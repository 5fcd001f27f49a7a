//! Read-only snapshots of the registries, built on the owner thread and
//! handed back to requesters.

use serde::{Deserialize, Serialize};

use cbc_core::{CbcMessage, Category, SmscbPayload};

use crate::state::CbcState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRow {
    pub name: Option<String>,
    pub remote_host: Option<String>,
    /// `None` = matched by IP only.
    pub remote_port: Option<u16>,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbsRow {
    pub message_id: u16,
    pub serial_nr: u16,
    pub cbe_name: String,
    pub category: Category,
    pub rep_period: u16,
    pub extended_cbch: bool,
    pub dcs: u8,
    pub num_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtwsRow {
    pub message_id: u16,
    pub serial_nr: u16,
    pub cbe_name: String,
    pub category: Category,
    pub warning_type: u16,
    /// Hex-encoded Warning-Security-Information, empty if none.
    pub warning_sec_info: String,
}

pub fn peer_rows(state: &CbcState) -> Vec<PeerRow> {
    state
        .peers
        .iter()
        .map(|p| PeerRow {
            name: p.name.clone(),
            remote_host: p.remote_host.clone(),
            remote_port: p.remote_port,
            protocol: p.proto.to_string(),
        })
        .collect()
}

fn cbs_row(m: &CbcMessage) -> Option<CbsRow> {
    let SmscbPayload::Cbs(cbs) = &m.msg.payload else {
        return None;
    };
    Some(CbsRow {
        message_id: m.message_id(),
        serial_nr: m.serial_nr(),
        cbe_name: m.cbe_name.clone(),
        category: m.category,
        rep_period: m.rep_period,
        extended_cbch: m.extended_cbch,
        dcs: cbs.dcs,
        num_pages: cbs.pages.len(),
    })
}

fn etws_row(m: &CbcMessage) -> Option<EtwsRow> {
    let SmscbPayload::Etws(etws) = &m.msg.payload else {
        return None;
    };
    Some(EtwsRow {
        message_id: m.message_id(),
        serial_nr: m.serial_nr(),
        cbe_name: m.cbe_name.clone(),
        category: m.category,
        warning_type: etws.warning_type,
        warning_sec_info: hex::encode(&etws.warning_sec_info),
    })
}

pub fn cbs_rows(state: &CbcState) -> Vec<CbsRow> {
    state.messages.cbs().filter_map(cbs_row).collect()
}

pub fn etws_rows(state: &CbcState) -> Vec<EtwsRow> {
    state.messages.etws().filter_map(etws_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer_registry::PeerRegistry;
    use cbc_core::{CbsPayload, EtwsPayload, Scope, SmscbMessage, UnknownPeerPolicy};

    fn message(message_id: u16, payload: SmscbPayload) -> CbcMessage {
        CbcMessage {
            cbe_name: "cbe".into(),
            category: Category::HighPriority,
            rep_period: 4,
            extended_cbch: true,
            warning_period_sec: None,
            num_bcast: 0,
            scope: Scope::Plmn,
            msg: SmscbMessage {
                message_id,
                serial_nr: 0x20,
                payload,
            },
        }
    }

    #[test]
    fn rows_split_by_payload_kind() {
        let mut state = CbcState::new(PeerRegistry::new(UnknownPeerPolicy::Accept));
        state.messages.upsert(message(
            1,
            SmscbPayload::Cbs(CbsPayload {
                dcs: 0x11,
                pages: vec![vec![0; 82], vec![0; 82]],
            }),
        ));
        state.messages.upsert(message(
            2,
            SmscbPayload::Etws(EtwsPayload {
                warning_type: 3,
                warning_sec_info: vec![0xde, 0xad],
            }),
        ));

        let cbs = cbs_rows(&state);
        assert_eq!(cbs.len(), 1);
        assert_eq!(cbs[0].dcs, 0x11);
        assert_eq!(cbs[0].num_pages, 2);
        assert!(cbs[0].extended_cbch);

        let etws = etws_rows(&state);
        assert_eq!(etws.len(), 1);
        assert_eq!(etws[0].warning_type, 3);
        assert_eq!(etws[0].warning_sec_info, "dead");
    }

    #[test]
    fn peer_rows_follow_insertion_order() {
        let mut state = CbcState::new(PeerRegistry::new(UnknownPeerPolicy::Accept));
        state.peers.contact("10.0.0.2", 2);
        state.peers.contact("10.0.0.1", 1);
        let rows = peer_rows(&state);
        let hosts: Vec<_> = rows.iter().filter_map(|r| r.remote_host.as_deref()).collect();
        assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.1"]);
        assert_eq!(rows[0].protocol, "cbsp");
        assert!(rows[0].name.is_none());
    }

    #[test]
    fn category_serializes_by_name() {
        let row = CbsRow {
            message_id: 0x10,
            serial_nr: 0x20,
            cbe_name: "cbe".into(),
            category: Category::HighPriority,
            rep_period: 4,
            extended_cbch: false,
            dcs: 0x0f,
            num_pages: 1,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["category"], "high_priority");
        assert_eq!(value["message_id"], 16);
    }
}
