//! Core data types flowing through the feed pipeline
//!
//! ```text
//! NodeRecord (decoded from a diff, consumed immediately)
//!     ↓
//! FilteredChange (first in-region sighting of a changeset)
//!     ↓
//! EnrichedChange (author, edit count, comment, profile image)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Replication sequence number. Total order defines processing order.
pub type SequenceNumber = u64;

/// OpenStreetMap user id
pub type UserId = u64;

/// Changeset identifier (the grouping unit edits are reported by)
///
/// Ordered numerically, so delivery order matches ascending changeset ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangesetId(pub u64);

impl fmt::Display for ChangesetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangesetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChangesetId)
    }
}

/// Section of an osmChange document a node was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
}

impl ChangeAction {
    pub(crate) fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"create" => Some(ChangeAction::Create),
            b"modify" => Some(ChangeAction::Modify),
            b"delete" => Some(ChangeAction::Delete),
            _ => None,
        }
    }
}

/// A single node edit decoded from a replication diff
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub changeset: ChangesetId,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub action: ChangeAction,
}

/// First in-region sighting of a changeset within one diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredChange {
    pub changeset: ChangesetId,
    pub timestamp: DateTime<Utc>,
}

/// Placeholder used when a changeset carries no `comment` tag
pub const NO_COMMENT: &str = "(no comment)";

/// A changeset ready to be formatted and delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedChange {
    pub changeset: ChangesetId,
    pub author_id: UserId,
    pub author_name: String,
    pub edit_count: u64,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    /// Cached profile image of the author, `None` if absent or lookup failed
    pub author_image: Option<String>,
}

/// Inclusive run of sequence numbers processed and committed as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub start: SequenceNumber,
    pub end: SequenceNumber,
}

impl Batch {
    /// Plan the next batch after `checkpoint`, clamped to `max_width` sequences.
    ///
    /// Returns `None` when the cursor has not advanced past the checkpoint.
    pub fn plan(
        checkpoint: SequenceNumber,
        cursor: SequenceNumber,
        max_width: u64,
    ) -> Option<Self> {
        if checkpoint >= cursor || max_width == 0 {
            return None;
        }
        let end = cursor.min(checkpoint.saturating_add(max_width));
        Some(Self {
            start: checkpoint + 1,
            end,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn sequences(&self) -> RangeInclusive<SequenceNumber> {
        self.start..=self.end
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
