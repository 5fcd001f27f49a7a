//! Configuration commands.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_text, post_json, put_json_body};

#[derive(Deserialize)]
struct ConfigWriteResponse {
    path: String,
    peers: usize,
}

#[derive(Serialize)]
struct UnknownPeersRequest<'a> {
    policy: &'a str,
}

pub async fn cmd_show_running_config(port: u16) -> Result<()> {
    let text = get_text(&format!("{}/config", base_url(port))).await?;
    print!("{}", text);
    Ok(())
}

pub async fn cmd_config_write(port: u16) -> Result<()> {
    let resp: ConfigWriteResponse = post_json(&format!("{}/config/write", base_url(port))).await?;
    println!("Wrote {} peers to {}", resp.peers, resp.path);
    Ok(())
}

pub async fn cmd_unknown_peers(port: u16, policy: &str) -> Result<()> {
    if policy != "accept" && policy != "reject" {
        bail!("unknown-peers takes 'accept' or 'reject', not '{}'", policy);
    }
    put_json_body(
        &format!("{}/config/unknown-peers", base_url(port)),
        &UnknownPeersRequest { policy },
    )
    .await?;
    println!("unknown-peers {}", policy);
    Ok(())
}
