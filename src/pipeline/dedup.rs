//! Spatial filter reducing a diff to unique in-region changesets
//!
//! One pass over the decoded records. For each changeset not yet recorded the
//! region test runs; the first in-region node wins and fixes the timestamp.
//! Once a changeset is recorded its later nodes are not tested again, which
//! keeps large diffs cheap when a single changeset touches many nodes.

use super::types::{ChangesetId, FilteredChange, NodeRecord};
use crate::error::DecodeError;
use crate::region::RegionTest;
use std::collections::HashMap;

/// Reduce `records` to one [`FilteredChange`] per changeset seen in `region`.
///
/// A decode error stops the scan and is returned; partial results are dropped.
pub fn reduce<I>(
    records: I,
    region: &dyn RegionTest,
) -> Result<HashMap<ChangesetId, FilteredChange>, DecodeError>
where
    I: IntoIterator<Item = Result<NodeRecord, DecodeError>>,
{
    let mut filtered: HashMap<ChangesetId, FilteredChange> = HashMap::new();

    for record in records {
        let record = record?;
        if filtered.contains_key(&record.changeset) {
            continue;
        }
        if region.contains(record.lat, record.lon) {
            filtered.insert(
                record.changeset,
                FilteredChange {
                    changeset: record.changeset,
                    timestamp: record.timestamp,
                },
            );
        }
    }

    Ok(filtered)
}
