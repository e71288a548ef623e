//! GET-based webhook commands for relays and schedules.

use serde::Serialize;
use tracing::{info, warn};

use super::retry::RetryPolicy;
use super::schedule::NewSchedule;
use crate::error::RelayError;
use crate::reading::{Field, Node, Reading};

/// Proof that the webhook accepted a command.
///
/// Acceptance says nothing about the physical relay; see [`verify_power`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayReceipt {
    pub attempts: u32,
}

/// Client for the automation webhook.
///
/// Commands are not idempotent: calling [`RelayClient::control`] twice sends
/// two commands.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    webhook_url: String,
    retry: RetryPolicy,
}

impl RelayClient {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
            retry,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    /// Switches `device_id` on or off.
    ///
    /// # Errors
    ///
    /// Returns a `RelayError` when the webhook is not configured, answers
    /// 4xx, or keeps failing after every attempt of the retry policy.
    pub async fn control(&self, device_id: &str, on: bool) -> Result<RelayReceipt, RelayError> {
        let value = if on { "true" } else { "false" };
        let receipt = self
            .send(&[("action", "control"), ("id", device_id), ("value", value)])
            .await?;
        info!(device = device_id, on, attempts = receipt.attempts, "relay command accepted");
        Ok(receipt)
    }

    /// Adds a schedule entry.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::MissingField` before sending anything when a
    /// field is blank, otherwise as [`RelayClient::control`].
    pub async fn add_schedule(&self, entry: &NewSchedule) -> Result<RelayReceipt, RelayError> {
        entry.validate()?;
        let state = if entry.state { "true" } else { "false" };
        self.send(&[
            ("action", "add_schedule"),
            ("device", entry.device.as_str()),
            ("date", entry.date.as_str()),
            ("time", entry.time.as_str()),
            ("state", state),
            ("repeat", entry.repeat.as_str()),
        ])
        .await
    }

    /// Deletes the schedule entry with `id`.
    ///
    /// # Errors
    ///
    /// As [`RelayClient::add_schedule`].
    pub async fn delete_schedule(&self, id: &str) -> Result<RelayReceipt, RelayError> {
        if id.trim().is_empty() {
            return Err(RelayError::MissingField("id"));
        }
        self.send(&[("action", "del_schedule"), ("id", id)]).await
    }

    async fn send(&self, query: &[(&str, &str)]) -> Result<RelayReceipt, RelayError> {
        if !self.is_configured() {
            return Err(RelayError::NotConfigured);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.retry.max_attempts;
            match self.client.get(&self.webhook_url).query(query).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(RelayReceipt { attempts: attempt });
                }
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_server_error() || last {
                        warn!(status = status.as_u16(), attempt, "webhook rejected command");
                        return Err(RelayError::Status {
                            status: status.as_u16(),
                            attempts: attempt,
                        });
                    }
                    warn!(status = status.as_u16(), attempt, "webhook error, retrying");
                }
                Err(source) => {
                    if last {
                        warn!(error = %source, attempt, "webhook unreachable");
                        return Err(RelayError::Transport {
                            attempts: attempt,
                            source,
                        });
                    }
                    warn!(error = %source, attempt, "webhook request failed, retrying");
                }
            }
            let wait = self.retry.jittered(attempt, &mut rand::rng());
            tokio::time::sleep(wait).await;
        }
    }
}

/// Infers the physical relay state from a reading taken after the command.
///
/// The relay is considered on when the node draws more than `threshold_w`.
/// Returns `Some(true)` when that matches the commanded state `on`,
/// `Some(false)` when it does not, and `None` when the node has no power
/// value.
pub fn verify_power(reading: &Reading, node: Node, on: bool, threshold_w: f64) -> Option<bool> {
    let watts = reading.value(node, Field::Power)?;
    Some((watts > threshold_w) == on)
}
