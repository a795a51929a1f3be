//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to lcgd at {} — is it running?", url))?
        .error_for_status()
        .with_context(|| format!("lcgd rejected request to {}", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

/// Fetch `url` and print the body as indented JSON.
pub async fn print_raw(url: &str) -> Result<()> {
    let value: serde_json::Value = get_json(url).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("failed to format response")?
    );
    Ok(())
}
