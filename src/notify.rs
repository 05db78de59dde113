//! Discord-style webhook notifications.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

const COLOR_OK: u32 = 0x00FF00;
const COLOR_ERROR: u32 = 0xFF0000;
/// Discord rejects embed descriptions longer than this.
const MAX_DESCRIPTION_CHARS: usize = 4096;
const FOOTER: &str = "novelty-bot";

pub(crate) struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
    title: String,
}

impl Notifier {
    pub fn new(webhook_url: impl Into<String>, country: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("novelty-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            title: format!("Novelty automation ({country})"),
        })
    }

    pub async fn send(&self, message: &str, is_error: bool) -> Result<()> {
        let payload = build_payload(&self.title, message, is_error, &crate::model::now_rfc3339());
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("webhook returned {status}");
        }
        info!(%status, "notification delivered");
        Ok(())
    }

    /// Send and log failures instead of returning them.
    pub async fn send_best_effort(&self, message: &str, is_error: bool) {
        if let Err(e) = self.send(message, is_error).await {
            warn!(error = %format!("{e:#}"), "notification not delivered");
        }
    }
}

pub(crate) fn build_payload(title: &str, message: &str, is_error: bool, timestamp: &str) -> Value {
    let description: String = message.chars().take(MAX_DESCRIPTION_CHARS).collect();
    json!({
        "embeds": [{
            "title": title,
            "description": description,
            "color": if is_error { COLOR_ERROR } else { COLOR_OK },
            "timestamp": timestamp,
            "footer": { "text": FOOTER },
        }]
    })
}

pub(crate) fn start_message(now: OffsetDateTime) -> String {
    let hhmm = now
        .to_offset(time::UtcOffset::UTC)
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| "--:--".into());
    format!("Automation started ({hhmm} UTC)")
}
