use gpdload_client::GpdUploadClient;
use gpdload_domain::PollState;
use gpdload_types::UploadStatus;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Repeatedly reads an upload's status until every submitted item is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPoller {
    pub interval: Duration,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// The completed status.
    pub status: UploadStatus,
    /// Number of status reads, including the completing one.
    pub polls: u32,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("no response from status endpoint {url}")]
    NoResponse { url: String },

    #[error("status endpoint {url} answered {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("status endpoint {url} returned an unreadable body: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("upload not completed after {polls} polls in {elapsed:?} ({processed}/{submitted} items)")]
    TimedOut {
        polls: u32,
        elapsed: Duration,
        processed: u64,
        submitted: u64,
    },
}

impl UploadPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Poll `status_url` (absolute or relative to the client's base URL).
    pub async fn wait(
        &self,
        client: &GpdUploadClient,
        status_url: &str,
    ) -> Result<PollOutcome, PollError> {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            let status = read_status(client, status_url).await?;
            polls += 1;
            let elapsed = start.elapsed();

            if PollState::from_status(&status).is_terminal() {
                info!(
                    url = status_url,
                    polls,
                    duration_ms = elapsed.as_millis() as u64,
                    "upload completed"
                );
                return Ok(PollOutcome {
                    status,
                    polls,
                    elapsed,
                });
            }

            debug!(
                url = status_url,
                processed = status.processed_item,
                submitted = status.submitted_item,
                "upload pending"
            );

            if let Some(timeout) = self.timeout
                && elapsed >= timeout
            {
                return Err(PollError::TimedOut {
                    polls,
                    elapsed,
                    processed: status.processed_item,
                    submitted: status.submitted_item,
                });
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

async fn read_status(client: &GpdUploadClient, url: &str) -> Result<UploadStatus, PollError> {
    let resp = client
        .status(url)
        .await
        .ok_or_else(|| PollError::NoResponse {
            url: url.to_string(),
        })?;
    if !resp.is_success() {
        return Err(PollError::UnexpectedStatus {
            url: url.to_string(),
            status: resp.status,
            body: resp.body,
        });
    }
    resp.json().map_err(|source| PollError::InvalidBody {
        url: url.to_string(),
        source,
    })
}
