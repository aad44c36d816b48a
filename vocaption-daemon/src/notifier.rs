//! Webhook notifications
//!
//! Optional side channel that mirrors finalized transcripts to a chat
//! webhook. Delivery is fire-and-forget; failures are logged and dropped.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::NotifierSettings;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
}

/// Fire-and-forget webhook sink for finalized transcripts.
pub struct Notifier {
    settings: NotifierSettings,
    client: Mutex<Option<Client>>,
}

impl Notifier {
    pub fn new(settings: NotifierSettings) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
        }
    }

    fn is_active(&self) -> bool {
        self.settings.enabled && self.settings.webhook_url.is_some()
    }

    /// Send one message to the configured webhook. No-op when disabled or
    /// unconfigured; never fails the caller.
    pub async fn send(&self, content: &str) {
        if !self.is_active() {
            return;
        }
        let Some(url) = &self.settings.webhook_url else {
            return;
        };
        if content.trim().is_empty() {
            return;
        }

        let client = {
            let mut guard = self.client.lock().await;
            match Self::ensure_client(&mut guard) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Webhook client could not be initialised: {e}");
                    return;
                }
            }
        };

        let payload = WebhookPayload {
            content,
            username: &self.settings.username,
        };

        match client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Webhook notification delivered");
            }
            Ok(response) => {
                warn!("Webhook returned status {}", response.status());
            }
            Err(e) => {
                warn!("Failed to send webhook notification: {e}");
            }
        }
    }

    /// Drop the HTTP session.
    pub async fn close(&self) {
        self.client.lock().await.take();
    }

    fn ensure_client(slot: &mut Option<Client>) -> Result<Client> {
        if let Some(client) = slot {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("Failed to build webhook HTTP client")?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_never_connects() {
        let notifier = Notifier::new(NotifierSettings::default());
        notifier.send("hello").await;
        assert!(notifier.client.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_enabled_without_url_is_noop() {
        let notifier = Notifier::new(NotifierSettings {
            enabled: true,
            webhook_url: None,
            username: "Vocaption".to_string(),
        });
        notifier.send("hello").await;
        assert!(notifier.client.lock().await.is_none());
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            content: "session ended",
            username: "Vocaption",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"content": "session ended", "username": "Vocaption"})
        );
    }
}
