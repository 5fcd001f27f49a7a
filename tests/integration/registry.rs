use cbc_core::config::PeerConfig;
use cbc_core::{Category, PeerProtocol, UnknownPeerPolicy};
use cbc_services::peer_registry::Contact;

use crate::*;

#[test]
fn listing_scenario_cbs_only() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();

    bridge.create_message(cbs_message(0x10, 0x20, 4, 0x0f)).unwrap();
    let (cbs, etws) = bridge.list_messages().unwrap();
    assert_eq!(cbs.len(), 1);
    assert!(etws.is_empty());
    let row = &cbs[0];
    assert_eq!(row.message_id, 0x10);
    assert_eq!(row.serial_nr, 0x20);
    assert_eq!(row.category, Category::Normal);
    assert_eq!(row.rep_period, 4);
    assert!(!row.extended_cbch);
    assert_eq!(row.dcs, 0x0f);

    assert!(bridge.delete_message(0x10).unwrap());
    let (cbs, etws) = bridge.list_messages().unwrap();
    assert!(cbs.is_empty() && etws.is_empty());
    owner.shutdown().unwrap();
}

#[test]
fn etws_is_listed_apart_from_cbs_in_insertion_order() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    bridge.create_message(cbs_message(3, 1, 1, 0x0f)).unwrap();
    bridge.create_message(etws_message(0x1100, 2)).unwrap();
    bridge.create_message(cbs_message(1, 1, 1, 0x0f)).unwrap();

    let (cbs, etws) = bridge.list_messages().unwrap();
    let ids: Vec<u16> = cbs.iter().map(|r| r.message_id).collect();
    assert_eq!(ids, vec![3, 1]);
    assert_eq!(etws.len(), 1);
    assert_eq!(etws[0].message_id, 0x1100);
    assert_eq!(etws[0].warning_type, 1);
    owner.shutdown().unwrap();
}

#[test]
fn delete_of_unknown_id_is_success_and_changes_nothing() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    bridge.create_message(cbs_message(1, 1, 1, 0x0f)).unwrap();
    let before = bridge.list_messages().unwrap();

    assert!(!bridge.delete_message(99).unwrap());
    assert_eq!(bridge.list_messages().unwrap(), before);
    owner.shutdown().unwrap();
}

#[test]
fn duplicate_create_replaces_in_place() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    bridge.create_message(cbs_message(7, 1, 1, 0x0f)).unwrap();
    bridge.create_message(cbs_message(8, 1, 1, 0x0f)).unwrap();

    let created = bridge.create_message(cbs_message(7, 2, 9, 0x01)).unwrap();
    assert!(created.replaced);

    let (cbs, _) = bridge.list_messages().unwrap();
    assert_eq!(cbs.len(), 2);
    assert_eq!(cbs[0].message_id, 7);
    assert_eq!(cbs[0].serial_nr, 2);
    assert_eq!(cbs[0].rep_period, 9);
    assert_eq!(cbs[0].dcs, 0x01);
    owner.shutdown().unwrap();
}

#[test]
fn reject_policy_drops_unknown_peer() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();

    assert_eq!(bridge.peer_contact("192.0.2.9", 3000).unwrap(), Contact::Rejected);
    assert!(bridge.list_peers().unwrap().is_empty());
    owner.shutdown().unwrap();
}

#[test]
fn accept_policy_adds_and_lists_unknown_peer() {
    let owner = spawn_cbc(UnknownPeerPolicy::Accept);
    let bridge = owner.bridge();

    let contact = bridge.peer_contact("192.0.2.9", 3000).unwrap();
    assert!(matches!(contact, Contact::Accepted(_)));
    // second contact from the same address is the same peer
    assert_eq!(
        bridge.peer_contact("192.0.2.9", 3000).unwrap(),
        Contact::Known(contact.peer().unwrap())
    );

    let peers = bridge.list_peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].remote_host.as_deref(), Some("192.0.2.9"));
    assert_eq!(peers[0].name, None);

    // unnamed peers are not part of the persisted configuration
    let text = bridge.running_config().unwrap();
    assert_eq!(text, "cbc\n unknown-peers accept\n");
    owner.shutdown().unwrap();
}

#[test]
fn reconnecting_unknown_peers_do_not_accumulate() {
    let owner = spawn_cbc(UnknownPeerPolicy::Accept);
    let bridge = owner.bridge();
    bridge.create_message(cbs_message(0x10, 1, 4, 0x0f)).unwrap();

    // each reconnect arrives from a fresh ephemeral port
    for i in 0..50u16 {
        let peer = bridge
            .peer_contact("192.0.2.1", 40000 + i)
            .unwrap()
            .peer()
            .unwrap();
        assert!(bridge.session_down(peer).unwrap());
    }
    assert!(bridge.list_peers().unwrap().is_empty());
    assert_eq!(bridge.list_messages().unwrap().0.len(), 1);
    owner.shutdown().unwrap();
}

#[test]
fn configured_peer_is_known_and_removable() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let bridge = owner.bridge();
    let id = bridge
        .add_peer(PeerConfig {
            name: "bsc1".into(),
            remote_ip: Some("10.0.0.1".into()),
            remote_port: None,
            protocol: PeerProtocol::Cbsp,
        })
        .unwrap();

    assert_eq!(bridge.peer_contact("10.0.0.1", 40000).unwrap(), Contact::Known(id));
    bridge.session_up(id).unwrap();

    assert!(bridge.remove_peer("bsc1").unwrap());
    assert!(!bridge.remove_peer("bsc1").unwrap());
    assert_eq!(bridge.peer_contact("10.0.0.1", 40000).unwrap(), Contact::Rejected);
    owner.shutdown().unwrap();
}
