use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use cbc_api::ApiState;
use cbc_core::config::CbcConfig;
use cbc_core::UnknownPeerPolicy;
use cbc_services::session::new_session_table;
use cbc_services::OwnerHandle;

use crate::*;

/// Serve the API for `owner` on an ephemeral loopback port.
async fn serve(owner: &OwnerHandle, config_path: PathBuf) -> String {
    let state = ApiState {
        bridge: owner.bridge(),
        sessions: new_session_table(),
        base_config: Arc::new(CbcConfig::default()),
        config_path,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(cbc_api::serve_listener(state, listener));
    format!("http://{addr}{}", cbc_api::API_PREFIX)
}

async fn stop(owner: OwnerHandle) {
    tokio::task::spawn_blocking(move || owner.shutdown())
        .await
        .unwrap()
        .unwrap();
}

fn create_body(message_id: u16, serial_nr: u16) -> Value {
    json!({
        "cbe_name": "api-cbe",
        "category": "normal",
        "repetition_period": 4,
        "scope": { "scope_plmn": {} },
        "smscb_message": {
            "message_id": message_id,
            "serial_nr": { "serial_nr_encoded": serial_nr },
            "payload": { "payload_encoded": { "dcs": 15, "pages": ["41".repeat(82)] } }
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn create_list_delete_over_http() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let base = serve(&owner, scratch_dir("crud").join("config.toml")).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{base}/message"))
        .json(&create_body(0x10, 0x20))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["message_id"], 0x10);
    assert_eq!(created["replaced"], false);
    assert!(created["handoff_error"].is_null());

    let cbs: Value = client
        .get(format!("{base}/messages/cbs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cbs.as_array().unwrap().len(), 1);
    assert_eq!(cbs[0]["serial_nr"], 0x20);
    assert_eq!(cbs[0]["category"], "normal");
    assert_eq!(cbs[0]["rep_period"], 4);
    assert_eq!(cbs[0]["dcs"], 15);

    let etws: Value = client
        .get(format!("{base}/messages/etws"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(etws, json!([]));

    let deleted: Value = client
        .delete(format!("{base}/message/0x10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["existed"], true);

    let again: Value = client
        .delete(format!("{base}/message/16"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["existed"], false);

    stop(owner).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_create_is_bad_request() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let base = serve(&owner, scratch_dir("bad").join("config.toml")).await;
    let client = reqwest::Client::new();

    let mut body = create_body(1, 1);
    body["repetition_period"] = json!(0);
    let resp = client.post(format!("{base}/message")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{base}/message"))
        .json(&json!({ "cbe_name": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client.delete(format!("{base}/message/nope")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    stop(owner).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_config_round_trip_through_config_write() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let path = scratch_dir("config").join("config.toml");
    let base = serve(&owner, path.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/peers"))
        .json(&json!({ "name": "bsc1", "remote_ip": "10.0.0.1", "remote_port": 48049 }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    // duplicate names are refused
    let resp = client
        .post(format!("{base}/peers"))
        .json(&json!({ "name": "bsc1", "remote_ip": "10.0.0.2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .put(format!("{base}/config/unknown-peers"))
        .json(&json!({ "policy": "accept" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let peers: Value = client
        .get(format!("{base}/peers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(peers[0]["name"], "bsc1");
    assert_eq!(peers[0]["remote_port"], 48049);

    let text = client
        .get(format!("{base}/config"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(" unknown-peers accept\n"));
    assert!(text.contains(" peer bsc1\n  protocol cbsp\n  remote-port 48049\n  remote-ip 10.0.0.1\n"));

    let written: Value = client
        .post(format!("{base}/config/write"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(written["peers"], 1);

    let saved = CbcConfig::load_from(&path).unwrap();
    assert_eq!(saved.cbc.unknown_peers, UnknownPeerPolicy::Accept);
    assert_eq!(saved.peers.len(), 1);
    assert_eq!(saved.peers[0].name, "bsc1");
    assert_eq!(saved.peers[0].remote_port, Some(48049));

    stop(owner).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_owner_maps_to_service_unavailable() {
    let owner = spawn_cbc(UnknownPeerPolicy::Reject);
    let base = serve(&owner, scratch_dir("stopped").join("config.toml")).await;
    stop(owner).await;

    let resp = reqwest::get(format!("{base}/peers")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}
