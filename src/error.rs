//! Error types for the feed pipeline
//!
//! Every variant of [`FeedError`] aborts the batch it occurs in; the
//! checkpoint is left unchanged and the whole batch is retried on the next
//! trigger. Only configuration errors at startup stop the process.
//!
//! Not errors:
//! - profile image lookups degrade to "no image" instead of failing
//! - webhook rate limiting is a retry signal (`SendOutcome::RateLimited`)

use crate::persistence::PersistenceError;
use crate::pipeline::types::{ChangesetId, SequenceNumber};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Cursor or diff source unreachable, or the response was unusable
    #[error("upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    #[error("diff for sequence {sequence} not found upstream")]
    DiffNotFound { sequence: SequenceNumber },

    #[error("failed to decode diff for sequence {sequence}: {source}")]
    Decode {
        sequence: SequenceNumber,
        #[source]
        source: DecodeError,
    },

    #[error("changeset {changeset} lookup failed: {reason}")]
    EnrichmentLookup {
        changeset: ChangesetId,
        reason: String,
    },

    #[error("webhook delivery failed (status {status:?}): {reason}")]
    DeliveryFailure { status: Option<u16>, reason: String },

    #[error("checkpoint store: {0}")]
    Checkpoint(#[from] PersistenceError),
}

impl FeedError {
    pub fn upstream(url: impl Into<String>, reason: impl ToString) -> Self {
        FeedError::UpstreamUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to turn a diff payload into node records
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("malformed XML at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    #[error("expected <osmChange> root, found <{0}>")]
    UnexpectedRoot(String),

    #[error("node is missing required attribute `{0}`")]
    MissingAttribute(&'static str),

    #[error("node attribute `{name}` has invalid value {value:?}")]
    InvalidAttribute { name: &'static str, value: String },

    #[error("document ended before </osmChange>")]
    Truncated,

    #[error("decode task did not finish: {0}")]
    Interrupted(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
