//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api/ecbe/v1", port)
}

fn connect_error(url: &str) -> String {
    format!("failed to connect to cbcd at {}, is it running?", url)
}

/// Turn a non-2xx reply into an error carrying the daemon's message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("cbcd returned {}: {}", status, body.trim());
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::get(url).await.with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn get_text(url: &str) -> Result<String> {
    let resp = reqwest::get(url).await.with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .text()
        .await
        .context("failed to read response")
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    let resp = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<R>()
        .await
        .context("failed to parse response")
}

pub async fn put_json_body<T: Serialize>(url: &str, body: &T) -> Result<()> {
    let resp = reqwest::Client::new()
        .put(url)
        .json(body)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp).await?;
    Ok(())
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .with_context(|| connect_error(url))?;
    check(resp)
        .await?
        .json::<T>()
        .await
        .context("failed to parse response")
}
