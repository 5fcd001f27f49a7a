//! Peer and status commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, get_json, post_json_body};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PeerRow {
    name: Option<String>,
    remote_host: Option<String>,
    remote_port: Option<u16>,
    protocol: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    peers: usize,
    cbs_messages: usize,
    etws_messages: usize,
    sessions: Vec<SessionInfo>,
    bridge: BridgeInfo,
}

#[derive(Deserialize)]
struct SessionInfo {
    peer: String,
    remote: String,
    established_secs: u64,
}

#[derive(Deserialize)]
struct BridgeInfo {
    timeout_ms: u64,
    signaled: u64,
    abandoned: u64,
    completed_after_abandon: u64,
}

#[derive(Serialize)]
struct PeerAddRequest<'a> {
    name: &'a str,
    remote_ip: Option<&'a str>,
    remote_port: Option<u16>,
}

#[derive(Deserialize)]
struct PeerAddResponse {
    name: String,
    id: u64,
}

#[derive(Deserialize)]
struct PeerRemoveResponse {
    name: String,
    existed: bool,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  CBC Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Peers            : {}", resp.peers);
    println!("  CBS messages     : {}", resp.cbs_messages);
    println!("  ETWS messages    : {}", resp.etws_messages);
    println!("  Bridge timeout   : {}ms", resp.bridge.timeout_ms);
    println!(
        "  Ops signaled     : {} ({} abandoned, {} completed late)",
        resp.bridge.signaled, resp.bridge.abandoned, resp.bridge.completed_after_abandon
    );

    if resp.sessions.is_empty() {
        println!("\n  No active sessions.");
    } else {
        println!("\n  Sessions:");
        for s in &resp.sessions {
            println!("  ┌─ {}", s.peer);
            println!("  │  remote : {}", s.remote);
            println!("  └─ uptime : {}s", s.established_secs);
        }
    }
    Ok(())
}

pub async fn cmd_show_peers(port: u16) -> Result<()> {
    let rows: Vec<PeerRow> = get_json(&format!("{}/peers", base_url(port))).await?;
    if rows.is_empty() {
        println!("No peers configured.");
        return Ok(());
    }

    println!("|Name                |IP                     |Port |Proto");
    println!("|--------------------|-----------------------|-----|-----");
    for p in &rows {
        let port = p
            .remote_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "*".to_string());
        println!(
            "|{:<20}|{:<23}|{:<5}|{}",
            p.name.as_deref().unwrap_or("<unnamed>"),
            p.remote_host.as_deref().unwrap_or("<unset>"),
            port,
            p.protocol,
        );
    }
    Ok(())
}

pub async fn cmd_peer_add(port: u16, name: &str, ip: &str, remote_port: Option<&str>) -> Result<()> {
    let remote_port = remote_port
        .map(|p| p.parse::<u16>().context("remote port must be a number"))
        .transpose()?;
    let req = PeerAddRequest {
        name,
        remote_ip: Some(ip),
        remote_port,
    };
    let resp: PeerAddResponse = post_json_body(&format!("{}/peers", base_url(port)), &req).await?;
    println!("Added peer {} (id {})", resp.name, resp.id);
    Ok(())
}

pub async fn cmd_peer_remove(port: u16, name: &str) -> Result<()> {
    let resp: PeerRemoveResponse =
        delete_json(&format!("{}/peers/{}", base_url(port), name)).await?;
    if resp.existed {
        println!("Removed peer {}", resp.name);
    } else {
        println!("No peer named {}", resp.name);
    }
    Ok(())
}
