//! Replication feed access: cursor (`state.txt`) and raw diff download
//!
//! `state.txt` is a Java properties file:
//!
//! ```text
//! #Wed May 01 10:00:02 UTC 2024
//! sequenceNumber=6123456
//! timestamp=2024-05-01T10\:00\:00Z
//! ```
//!
//! The cursor is read fresh on every call, it is the frontier.

use super::diff::DiffPath;
use super::types::SequenceNumber;
use crate::error::{FeedError, FeedResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{StatusCode, Url};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// Compressed diff body, read as it arrives
pub type DiffBody = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait ReplicationSource: Send + Sync {
    /// Latest sequence number published upstream
    async fn latest_sequence(&self) -> FeedResult<SequenceNumber>;

    /// Compressed osmChange payload for `sequence`
    ///
    /// Resolves once the diff is known to exist; the body itself is streamed,
    /// so a failure mid-body surfaces while decoding.
    async fn fetch_diff(&self, sequence: SequenceNumber) -> FeedResult<DiffBody>;
}

/// Extract `sequenceNumber=<n>` from a state file
pub fn parse_state(text: &str) -> Option<SequenceNumber> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("sequenceNumber="))
        .find_map(|value| value.trim().parse().ok())
}

/// Replication source backed by the planet minutely directory
pub struct ReplicationClient {
    http: HttpClient,
    base: Url,
}

impl ReplicationClient {
    pub fn new(http: HttpClient, base: Url) -> Self {
        Self { http, base }
    }

    pub fn state_url(&self) -> FeedResult<Url> {
        self.base
            .join("state.txt")
            .map_err(|e| FeedError::upstream(self.base.as_str(), e))
    }

    pub fn diff_url(&self, sequence: SequenceNumber) -> FeedResult<Url> {
        self.base
            .join(&DiffPath::for_sequence(sequence).relative_path())
            .map_err(|e| FeedError::upstream(self.base.as_str(), e))
    }
}

#[async_trait]
impl ReplicationSource for ReplicationClient {
    async fn latest_sequence(&self) -> FeedResult<SequenceNumber> {
        let url = self.state_url()?;
        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| FeedError::upstream(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(FeedError::upstream(
                url.as_str(),
                format!("status {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::upstream(url.as_str(), e))?;

        parse_state(&body)
            .ok_or_else(|| FeedError::upstream(url.as_str(), "no sequenceNumber in state file"))
    }

    async fn fetch_diff(&self, sequence: SequenceNumber) -> FeedResult<DiffBody> {
        let url = self.diff_url(sequence)?;
        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| FeedError::upstream(url.as_str(), e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(FeedError::DiffNotFound { sequence }),
            status => {
                return Err(FeedError::upstream(
                    url.as_str(),
                    format!("status {}", status),
                ))
            }
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}
