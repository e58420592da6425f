use super::{NotificationPayload, NotificationSink};
use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;

/// POSTs each payload as JSON to the delivery service.
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = retries.max(1);
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms << (attempt - 1).min(10))
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("notification webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("notification webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "retrying webhook delivery");
            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }
}
