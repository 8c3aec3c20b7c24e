//! Streaming download with whole-file hash verification.

use std::path::Path;
use std::time::Instant;

use carton_schema::Hash;
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::progress::{DownloadProgress, ProgressHub};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),
}

/// Request for a download operation
#[derive(Debug)]
pub struct DownloadRequest<'a> {
    pub client: &'a Client,
    pub url: &'a str,
    pub dest: &'a Path,
    pub expected: &'a Hash,
    pub progress: Option<&'a ProgressHub>,
}

impl<'a> DownloadRequest<'a> {
    pub fn new(client: &'a Client, url: &'a str, dest: &'a Path, expected: &'a Hash) -> Self {
        Self {
            client,
            url,
            dest,
            expected,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a ProgressHub) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Download `url` to `dest`, returning the verified hex digest.
    ///
    /// The body is hashed while it streams to disk. On a mismatch `dest` is
    /// removed before the error is returned.
    pub async fn execute(self) -> Result<String, DownloadError> {
        let algorithm = self
            .expected
            .algorithm()
            .ok_or_else(|| DownloadError::UnsupportedAlgorithm(self.expected.algorithm_name().to_string()))?;

        let response = self
            .client
            .get(self.url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
            });
        }

        let expected_size = response.content_length();
        let mut file = File::create(self.dest).await?;
        let mut stream = response.bytes_stream();
        let mut hasher = algorithm.hasher();
        let mut transferred: u64 = 0;
        let started = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            transferred += chunk.len() as u64;
            if let Some(progress) = self.progress {
                progress
                    .publish(DownloadProgress::measure(
                        transferred,
                        expected_size,
                        started.elapsed(),
                    ))
                    .await;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let actual = hasher.finalize_hex();
        if !self.expected.matches_digest(&actual) {
            warn!(url = self.url, "hash mismatch, discarding download");
            tokio::fs::remove_file(self.dest).await.ok();
            return Err(DownloadError::HashMismatch {
                expected: self.expected.digest().to_string(),
                actual,
            });
        }

        debug!(url = self.url, bytes = transferred, "download verified");
        Ok(actual)
    }
}
