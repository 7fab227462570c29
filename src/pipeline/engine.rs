//! Feed Engine - drives batches from the checkpoint to the upstream cursor
//!
//! ## Architecture
//!
//! ```text
//! trigger()                       (single-flight, busy trigger is dropped)
//!     ↓
//! latest_sequence()               (fresh cursor read)
//!     ↓
//! Batch::plan()                   ([checkpoint+1, min(cursor, checkpoint+width)])
//!     ↓
//! fetch + decode + filter         (per sequence, bounded fan-out, body streamed)
//!     ↓
//! merge by changeset              (earliest sequence wins)
//!     ↓
//! enrich                          (bounded fan-out, then sorted by changeset id)
//!     ↓
//! Dispatcher::deliver()           (sequential chunks)
//!     ↓
//! CheckpointStore::commit(end)
//! ```
//!
//! A batch either commits its end sequence or leaves the checkpoint alone.
//! Delivery starts only after the whole batch is enriched, so notification
//! order is ascending changeset id regardless of fetch completion order.
//! A failed batch is delivered again in full on the next trigger, so
//! duplicates are possible but nothing is skipped.

use super::dedup;
use super::delivery::Dispatcher;
use super::diff;
use super::enrich::Enricher;
use super::replication::ReplicationSource;
use super::types::{Batch, ChangesetId, EnrichedChange, FilteredChange, SequenceNumber};
use crate::error::{DecodeError, FeedError, FeedResult};
use crate::persistence::CheckpointStore;
use crate::region::RegionTest;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::io::SyncIoBridge;

/// Batch sizing and fan-out limits
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_batch_width: u64,
    pub fetch_concurrency: usize,
    pub enrich_concurrency: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_batch_width: 5,
            fetch_concurrency: 5,
            enrich_concurrency: 10,
        }
    }
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Another run was in progress; nothing was done
    Skipped,
    /// First run: checkpoint set to the current cursor, backlog skipped
    Initialized { checkpoint: SequenceNumber },
    /// Cursor has not advanced past the checkpoint
    Idle { checkpoint: SequenceNumber },
    /// One or more batches delivered and committed
    CaughtUp {
        checkpoint: SequenceNumber,
        batches: usize,
        changes: usize,
    },
    /// A batch failed; the checkpoint stays at its last committed value
    Failed { checkpoint: Option<SequenceNumber> },
}

pub struct FeedEngine {
    source: Arc<dyn ReplicationSource>,
    region: Arc<dyn RegionTest>,
    enricher: Enricher,
    dispatcher: Dispatcher,
    store: CheckpointStore,
    limits: EngineLimits,
    busy: AtomicBool,
}

impl FeedEngine {
    pub fn new(
        source: Arc<dyn ReplicationSource>,
        region: Arc<dyn RegionTest>,
        enricher: Enricher,
        dispatcher: Dispatcher,
        store: CheckpointStore,
        limits: EngineLimits,
    ) -> Self {
        Self {
            source,
            region,
            enricher,
            dispatcher,
            store,
            limits: EngineLimits {
                max_batch_width: limits.max_batch_width.max(1),
                fetch_concurrency: limits.fetch_concurrency.max(1),
                enrich_concurrency: limits.enrich_concurrency.max(1),
            },
            busy: AtomicBool::new(false),
        }
    }

    /// Last committed sequence, `None` before the first run
    pub fn checkpoint(&self) -> Option<SequenceNumber> {
        self.store.last_processed()
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run batches until caught up with the cursor
    ///
    /// Only one trigger runs at a time; a trigger arriving while another is
    /// in progress returns [`TriggerOutcome::Skipped`] immediately.
    pub async fn trigger(&self) -> TriggerOutcome {
        log::debug!("Processing triggered");
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            log::info!("⏭️  Processing in progress, skipping trigger");
            return TriggerOutcome::Skipped;
        };

        match self.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ Processing stopped: {}", e);
                TriggerOutcome::Failed {
                    checkpoint: self.checkpoint(),
                }
            }
        }
    }

    async fn run(&self) -> FeedResult<TriggerOutcome> {
        let Some(mut checkpoint) = self.store.last_processed() else {
            return self.initialize().await;
        };

        let mut batches = 0;
        let mut changes = 0;

        loop {
            let cursor = self.source.latest_sequence().await?;
            log::info!(
                "Got latest sequence as {}, last processed is {}",
                cursor,
                checkpoint
            );

            let Some(batch) = Batch::plan(checkpoint, cursor, self.limits.max_batch_width) else {
                break;
            };

            changes += self.run_batch(batch).await?;
            checkpoint = batch.end;
            batches += 1;
        }

        if batches == 0 {
            Ok(TriggerOutcome::Idle { checkpoint })
        } else {
            log::info!(
                "✅ Caught up at {} ({} batches, {} changes)",
                checkpoint,
                batches,
                changes
            );
            Ok(TriggerOutcome::CaughtUp {
                checkpoint,
                batches,
                changes,
            })
        }
    }

    /// Skip the historical backlog: start from whatever is current now
    async fn initialize(&self) -> FeedResult<TriggerOutcome> {
        log::info!("No last sequence, starting from most recent");
        let latest = self.source.latest_sequence().await?;
        self.store.commit(latest)?;
        log::info!("🚀 Initialized checkpoint at {}", latest);
        Ok(TriggerOutcome::Initialized { checkpoint: latest })
    }

    /// Process, deliver and commit one batch; returns the number of changes delivered
    pub async fn run_batch(&self, batch: Batch) -> FeedResult<usize> {
        log::info!("🔄 Processing sequences {} ({} diffs)", batch, batch.len());

        let result = async {
            let changes = self.collect_batch(batch).await?;
            let messages = self.dispatcher.deliver(&changes).await?;
            self.store.commit(batch.end)?;
            log::info!(
                "📨 Delivered {} changes in {} messages for {}",
                changes.len(),
                messages,
                batch
            );
            Ok::<_, FeedError>(changes.len())
        }
        .await;

        if let Err(e) = &result {
            log::error!(
                "❌ Batch {} failed, checkpoint stays at {}: {}",
                batch,
                batch.start - 1,
                e
            );
        }
        result
    }

    /// Fetch, filter and enrich every sequence of `batch`, sorted by changeset id
    pub async fn collect_batch(&self, batch: Batch) -> FeedResult<Vec<EnrichedChange>> {
        let filtered = self.filter_batch(batch).await?;

        let lookups: Vec<_> = filtered
            .into_values()
            .map(move |change| self.enricher.enrich(change))
            .collect();
        let mut changes: Vec<EnrichedChange> = stream::iter(lookups)
            .buffer_unordered(self.limits.enrich_concurrency)
            .try_collect()
            .await?;

        changes.sort_by_key(|change| change.changeset);
        Ok(changes)
    }

    /// Unique in-region changesets across the batch, first sequence wins
    async fn filter_batch(
        &self,
        batch: Batch,
    ) -> FeedResult<BTreeMap<ChangesetId, FilteredChange>> {
        let fetches: Vec<_> = batch
            .sequences()
            .map(move |sequence| async move { (sequence, self.filter_sequence(sequence).await) })
            .collect();

        // Every sibling runs to completion so each failure gets logged
        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.limits.fetch_concurrency)
            .collect()
            .await;

        let mut per_sequence = BTreeMap::new();
        let mut first_error: Option<(SequenceNumber, FeedError)> = None;
        for (sequence, result) in results {
            match result {
                Ok(filtered) => {
                    per_sequence.insert(sequence, filtered);
                }
                Err(e) => {
                    log::error!("❌ Sequence {} failed: {}", sequence, e);
                    if first_error.as_ref().map_or(true, |(s, _)| sequence < *s) {
                        first_error = Some((sequence, e));
                    }
                }
            }
        }
        if let Some((_, e)) = first_error {
            return Err(e);
        }

        let mut merged = BTreeMap::new();
        for filtered in per_sequence.into_values() {
            for (changeset, change) in filtered {
                merged.entry(changeset).or_insert(change);
            }
        }
        Ok(merged)
    }

    async fn filter_sequence(
        &self,
        sequence: SequenceNumber,
    ) -> FeedResult<HashMap<ChangesetId, FilteredChange>> {
        log::debug!("Fetching sequence {}", sequence);
        let body = SyncIoBridge::new(self.source.fetch_diff(sequence).await?);
        let region = self.region.clone();

        // Decompression and XML parsing are blocking reads on the live body
        let filtered = tokio::task::spawn_blocking(move || {
            dedup::reduce(diff::decode_gzip(body), &*region)
        })
        .await
        .unwrap_or_else(|e| Err(DecodeError::Interrupted(e.to_string())))
        .map_err(|source| FeedError::Decode { sequence, source })?;

        log::debug!(
            "Processed {}: {} changesets in region",
            sequence,
            filtered.len()
        );
        Ok(filtered)
    }
}

/// Holds the busy flag for the duration of one run
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
