// Audio fetcher: one full GET per attempt, body buffered before it touches disk.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::{DownloadConfig, RetryPolicy};
use crate::error::DownloadError;
use crate::system::files::write_atomic;

/// Cap on the buffer reserved up front from `Content-Length`.
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    retry: RetryPolicy,
}

impl Downloader {
    pub fn new(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config.retry))
    }

    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Fetch `url` into `destination`, returning the number of bytes written.
    ///
    /// Transport errors and non-success statuses are retried up to the
    /// configured budget. A failed write is not retried.
    pub async fn download(&self, url: &Url, destination: &Path) -> Result<u64, DownloadError> {
        let max_attempts = self.retry.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.fetch_body(url).await {
                Ok(body) => {
                    write_atomic(destination, &body).await.map_err(|source| {
                        DownloadError::Filesystem {
                            path: destination.to_path_buf(),
                            source,
                        }
                    })?;
                    debug!(
                        "{} -> {} ({} bytes, attempt {})",
                        url,
                        destination.display(),
                        body.len(),
                        attempt
                    );
                    return Ok(body.len() as u64);
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < max_attempts {
                warn!(
                    "download attempt {}/{} for {} failed: {}; retrying",
                    attempt, max_attempts, url, last_error
                );
                tokio::time::sleep(self.retry.backoff()).await;
            }
        }

        Err(DownloadError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    async fn fetch_body(&self, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;

        let hint = response.content_length().unwrap_or(0).min(PREALLOC_LIMIT);
        let mut body = Vec::with_capacity(hint as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }
}
