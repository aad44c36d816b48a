//! Closed-caption publishing
//!
//! Pushes each finalized transcript to the meeting's caption POST URL.
//! Captions are a best-effort, latest-wins presentation channel: throttled
//! updates are dropped rather than queued, and transport failures never
//! reach the pipeline.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::CaptionSettings;

const POST_TIMEOUT: Duration = Duration::from_secs(10);

struct PublisherInner {
    client: Option<Client>,
    sequence: u64,
    last_success: Option<Instant>,
}

/// Rate-limited, sequence-numbered caption pusher.
///
/// The inner lock serializes session creation and sends, so at most one
/// caption POST is ever in flight.
pub struct CaptionPublisher {
    settings: CaptionSettings,
    post_url: Option<Url>,
    inner: Mutex<PublisherInner>,
}

impl CaptionPublisher {
    pub fn new(settings: CaptionSettings) -> Result<Self> {
        let post_url = settings
            .post_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("Invalid caption POST URL")?;

        Ok(Self {
            settings,
            post_url,
            inner: Mutex::new(PublisherInner {
                client: None,
                sequence: 0,
                last_success: None,
            }),
        })
    }

    /// Open the shared HTTP session. Calling `post` first is also fine; it
    /// self-initializes.
    pub async fn start(&self) -> Result<()> {
        if !self.settings.enabled {
            info!("Caption publishing disabled by configuration");
            return Ok(());
        }
        if self.post_url.is_none() {
            warn!("Caption URL not configured; captions will not be sent");
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        Self::ensure_client(&mut inner)?;
        Ok(())
    }

    /// Close the shared HTTP session.
    pub async fn close(&self) {
        self.inner.lock().await.client = None;
    }

    /// Post one caption update, honoring rate limits and sequence numbers.
    ///
    /// Every attempted send consumes a sequence number, including updates
    /// skipped by the throttle, so the counter tracks attempts rather than
    /// deliveries.
    pub async fn post(&self, text: &str) {
        if !self.settings.enabled {
            return;
        }
        let Some(base_url) = &self.post_url else {
            return;
        };

        let payload = text.trim();
        if payload.is_empty() {
            debug!("Skipping empty caption payload");
            return;
        }

        let mut inner = self.inner.lock().await;

        let sequence = inner.sequence;
        inner.sequence += 1;

        if let Some(last) = inner.last_success {
            if last.elapsed().as_secs_f64() < self.settings.min_post_interval_seconds {
                debug!("Throttling caption update to honour minimum interval");
                return;
            }
        }

        let client = match Self::ensure_client(&mut inner) {
            Ok(client) => client,
            Err(e) => {
                error!("Caption session could not be initialised: {e}");
                return;
            }
        };

        let url = build_url_with_sequence(base_url, sequence);

        match client
            .post(url)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(payload.to_string())
            .send()
            .await
        {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                debug!("Caption posted (seq={sequence})");
                inner.last_success = Some(Instant::now());
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!("Caption POST failed: status={status} body={body}");
            }
            Err(e) => {
                error!("Failed to post caption: {e}");
            }
        }
    }

    /// Whether the shared HTTP session is currently open.
    pub async fn is_started(&self) -> bool {
        self.inner.lock().await.client.is_some()
    }

    /// Next sequence number to be consumed.
    pub async fn sequence(&self) -> u64 {
        self.inner.lock().await.sequence
    }

    fn ensure_client(inner: &mut PublisherInner) -> Result<Client> {
        if let Some(client) = &inner.client {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .context("Failed to build caption HTTP client")?;
        inner.client = Some(client.clone());
        Ok(client)
    }
}

/// Rebuild the base URL, preserving every query parameter except `seq`,
/// which is replaced with the current counter value.
fn build_url_with_sequence(base: &Url, sequence: u64) -> Url {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "seq")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("seq", &sequence.to_string());
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_appends_seq() {
        let base = Url::parse("https://example.com/closedcaption").unwrap();
        let url = build_url_with_sequence(&base, 0);
        assert_eq!(url.as_str(), "https://example.com/closedcaption?seq=0");
    }

    #[test]
    fn test_build_url_preserves_existing_query() {
        let base = Url::parse("https://example.com/cc?id=abc&tk=xyz").unwrap();
        let url = build_url_with_sequence(&base, 7);
        assert_eq!(url.as_str(), "https://example.com/cc?id=abc&tk=xyz&seq=7");
    }

    #[test]
    fn test_build_url_replaces_stale_seq() {
        let base = Url::parse("https://example.com/cc?seq=99&id=abc").unwrap();
        let url = build_url_with_sequence(&base, 3);
        assert_eq!(url.as_str(), "https://example.com/cc?id=abc&seq=3");
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_noop() {
        let publisher = CaptionPublisher::new(CaptionSettings {
            post_url: Some("https://example.com/cc".to_string()),
            enabled: false,
            min_post_interval_seconds: 1.0,
        })
        .unwrap();

        publisher.start().await.unwrap();
        publisher.post("hello").await;

        assert!(!publisher.is_started().await);
        assert_eq!(publisher.sequence().await, 0);
    }

    #[tokio::test]
    async fn test_unset_url_is_noop() {
        let publisher = CaptionPublisher::new(CaptionSettings::default()).unwrap();
        publisher.start().await.unwrap();
        publisher.post("hello").await;

        assert!(!publisher.is_started().await);
        assert_eq!(publisher.sequence().await, 0);
    }

    #[tokio::test]
    async fn test_empty_text_does_not_consume_sequence() {
        let publisher = CaptionPublisher::new(CaptionSettings {
            post_url: Some("https://example.com/cc".to_string()),
            ..Default::default()
        })
        .unwrap();

        publisher.post("   ").await;
        assert_eq!(publisher.sequence().await, 0);
    }

    #[test]
    fn test_invalid_url_rejected_at_construction() {
        let result = CaptionPublisher::new(CaptionSettings {
            post_url: Some("not a url".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
