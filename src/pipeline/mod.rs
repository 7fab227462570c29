//! # Replication Feed Pipeline
//!
//! Watches the OpenStreetMap minutely replication feed for edits inside a
//! region and posts one notification per changeset to a webhook.
//!
//! ## Flow
//!
//! 1. The scheduler triggers the engine every poll interval
//! 2. The engine reads the upstream cursor and plans a batch of sequences
//! 3. Each diff in the batch is fetched, decoded and filtered concurrently
//! 4. Unique changesets are enriched with author, edit count and comment
//! 5. Results are sorted by changeset id and delivered in sequential chunks
//! 6. The checkpoint advances to the batch end only after full delivery
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (NodeRecord, FilteredChange, EnrichedChange, Batch)
//! - `replication` - Cursor reader and raw diff download
//! - `diff` - Diff addressing and streaming osmChange decode
//! - `dedup` - Spatial filter and per-diff changeset dedup
//! - `osm` - Changeset and user API client
//! - `profile_cache` - Process-lifetime author image cache
//! - `enrich` - Metadata enrichment
//! - `webhook` - Message format and HTTP notifier
//! - `delivery` - Ordered, rate-limit aware dispatcher
//! - `engine` - Batch planning, execution and checkpointing
//! - `scheduler` - Periodic trigger

pub mod types;
pub mod replication;
pub mod diff;
pub mod dedup;
pub mod osm;
pub mod profile_cache;
pub mod enrich;
pub mod webhook;
pub mod delivery;
pub mod engine;
pub mod scheduler;

// Re-export commonly used types
pub use types::{Batch, ChangesetId, EnrichedChange, FilteredChange, NodeRecord, SequenceNumber};
pub use replication::{DiffBody, ReplicationClient, ReplicationSource};
pub use osm::{ChangesetApi, OsmClient};
pub use enrich::Enricher;
pub use webhook::{Notifier, SendOutcome, WebhookMessage, WebhookNotifier};
pub use delivery::{Dispatcher, OsmLinks, Sleeper, TokioSleeper};
pub use engine::{EngineLimits, FeedEngine, TriggerOutcome};
