//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`StatusUpdate`] to an external
//! URL. Failed attempts are retried three times with exponential backoff
//! (1 s, 2 s, 4 s).

use std::time::Duration;

use serde::Serialize;

use crate::bus::StatusUpdate;

/// Retry delays (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Header carrying the dot-separated event type.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event_type: String,
    message_id: String,
    payload: &'a StatusUpdate,
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Delivers status updates to one webhook endpoint.
#[derive(Clone)]
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    /// Create a delivery targeting `url` with a per-attempt `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            retry_delays: RETRY_DELAYS.to_vec(),
        })
    }

    /// Replace the backoff schedule; one retry per delay.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an update with retry.
    ///
    /// Returns `Ok(())` on the first successful attempt, otherwise the
    /// error of the last attempt.
    pub async fn deliver(&self, prefix: &str, update: &StatusUpdate) -> Result<(), WebhookError> {
        let payload = WebhookPayload {
            event_type: update.event_type(prefix),
            message_id: update.message_id(),
            payload: update,
        };

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        event_type = %payload.event_type,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        self.try_send(&payload).await.inspect_err(|e| {
            tracing::error!(
                url = %self.url,
                event_type = %payload.event_type,
                error = %e,
                "Webhook delivery failed after all retries"
            );
        })
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, payload: &WebhookPayload<'_>) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(&self.url)
            .header(EVENT_TYPE_HEADER, &payload.event_type)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
