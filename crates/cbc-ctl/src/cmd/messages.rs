//! Message commands: show, create, delete.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json, post_json_body};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CbsRow {
    message_id: u16,
    serial_nr: u16,
    cbe_name: String,
    category: String,
    rep_period: u16,
    extended_cbch: bool,
    dcs: u8,
    num_pages: usize,
}

#[derive(Deserialize)]
struct EtwsRow {
    message_id: u16,
    serial_nr: u16,
    cbe_name: String,
    category: String,
    warning_type: u16,
    warning_sec_info: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    message_id: u16,
    serial_nr: u16,
    replaced: bool,
    handoff_error: Option<String>,
}

#[derive(Deserialize)]
struct DeleteResponse {
    message_id: u16,
    existed: bool,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_show_cbs(port: u16) -> Result<()> {
    let rows: Vec<CbsRow> = get_json(&format!("{}/messages/cbs", base_url(port))).await?;
    if rows.is_empty() {
        println!("No active CBS messages.");
        return Ok(());
    }

    println!("|MsgId|SerNo|      CBE Name      |  Category   |Period|E|DCS |Pages");
    println!("|-----|-----|--------------------|-------------|------|-|----|-----");
    for r in &rows {
        println!(
            "| {:04x}| {:04x}|{:<20}|{:<13}|{:>6}|{}|0x{:02x}|{:>5}",
            r.message_id,
            r.serial_nr,
            truncate(&r.cbe_name, 20),
            r.category,
            r.rep_period,
            if r.extended_cbch { 'E' } else { 'N' },
            r.dcs,
            r.num_pages,
        );
    }
    Ok(())
}

pub async fn cmd_show_etws(port: u16) -> Result<()> {
    let rows: Vec<EtwsRow> = get_json(&format!("{}/messages/etws", base_url(port))).await?;
    if rows.is_empty() {
        println!("No active ETWS messages.");
        return Ok(());
    }

    println!("|MsgId|SerNo|      CBE Name      |  Category   |WType|Security Info");
    println!("|-----|-----|--------------------|-------------|-----|-------------");
    for r in &rows {
        println!(
            "| {:04x}| {:04x}|{:<20}|{:<13}|{:>5}|{}",
            r.message_id,
            r.serial_nr,
            truncate(&r.cbe_name, 20),
            r.category,
            r.warning_type,
            r.warning_sec_info,
        );
    }
    Ok(())
}

pub async fn cmd_create(port: u16, file: &str) -> Result<()> {
    let text = std::fs::read_to_string(Path::new(file))
        .with_context(|| format!("failed to read {}", file))?;
    let body: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", file))?;

    let resp: CreateResponse =
        post_json_body(&format!("{}/message", base_url(port)), &body).await?;
    let verb = if resp.replaced { "Replaced" } else { "Created" };
    println!(
        "{} message 0x{:04x} (serial 0x{:04x})",
        verb, resp.message_id, resp.serial_nr
    );
    if let Some(e) = resp.handoff_error {
        println!("  warning: {}", e);
    }
    Ok(())
}

pub async fn cmd_delete(port: u16, message_id: &str) -> Result<()> {
    let resp: DeleteResponse =
        delete_json(&format!("{}/message/{}", base_url(port), message_id)).await?;
    if resp.existed {
        println!("Deleted message 0x{:04x}", resp.message_id);
    } else {
        println!("No active message 0x{:04x}", resp.message_id);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
