use std::time::Duration;

use crate::error::FetchError;
use crate::fetcher::SnapshotSource;
use crate::snapshot::Snapshot;

/// Fetches the monitor snapshot with a single HTTP GET.
///
/// The client carries the request timeout, so a hung backend turns
/// into a `Transport` error instead of an open-ended Polling state.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport(&self, reason: impl Into<String>) -> FetchError {
        FetchError::Transport {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpFetcher {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.transport(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport(format!("reading body: {e}")))?;

        Snapshot::from_slice(&body).map_err(|source| FetchError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}
