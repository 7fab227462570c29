//! In-memory stand-ins for every network seam of the feed engine, plus a
//! scripted HTTP server for the real clients

#![allow(dead_code)]

pub mod stub_server;

use async_trait::async_trait;
use diffwatch::error::{FeedError, FeedResult};
use diffwatch::persistence::CheckpointStore;
use diffwatch::pipeline::osm::{ChangesetDetails, ProfileLookupError};
use diffwatch::pipeline::types::UserId;
use diffwatch::pipeline::{
    ChangesetApi, ChangesetId, DiffBody, Dispatcher, EngineLimits, Enricher, FeedEngine, Notifier,
    OsmLinks, ReplicationSource, SendOutcome, SequenceNumber, Sleeper, WebhookMessage,
};
use diffwatch::region::BoundingBox;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Url;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Node inside the test region
pub const INSIDE: (f64, f64) = (-36.85, 174.76);
/// Node outside the test region
pub const OUTSIDE: (f64, f64) = (51.5, -0.12);

pub fn region() -> BoundingBox {
    BoundingBox {
        top: -36.0,
        bottom: -37.5,
        left: 174.0,
        right: 175.5,
    }
}

/// Build a gzip osmChange diff from `(changeset, timestamp, (lat, lon))` nodes
pub fn diff(nodes: &[(u64, &str, (f64, f64))]) -> Vec<u8> {
    let mut xml = String::from("<?xml version='1.0' encoding='UTF-8'?>\n<osmChange version=\"0.6\">\n<modify>\n");
    for (i, (changeset, timestamp, (lat, lon))) in nodes.iter().enumerate() {
        xml.push_str(&format!(
            "<node id=\"{}\" version=\"2\" timestamp=\"{}\" changeset=\"{}\" lat=\"{}\" lon=\"{}\"/>\n",
            i + 1,
            timestamp,
            changeset,
            lat,
            lon
        ));
    }
    xml.push_str("</modify>\n</osmChange>\n");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[derive(Default)]
pub struct FakeReplication {
    pub latest: AtomicU64,
    pub diffs: Mutex<HashMap<SequenceNumber, Vec<u8>>>,
    pub delays: Mutex<HashMap<SequenceNumber, Duration>>,
    pub fetched: Mutex<Vec<SequenceNumber>>,
    pub latest_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeReplication {
    pub fn new(latest: SequenceNumber) -> Self {
        let fake = Self::default();
        fake.latest.store(latest, Ordering::SeqCst);
        fake
    }

    pub fn with_diff(self, sequence: SequenceNumber, payload: Vec<u8>) -> Self {
        self.diffs.lock().unwrap().insert(sequence, payload);
        self
    }

    pub fn with_delay(self, sequence: SequenceNumber, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(sequence, delay);
        self
    }

    pub fn fetched(&self) -> Vec<SequenceNumber> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

#[async_trait]
impl ReplicationSource for FakeReplication {
    async fn latest_sequence(&self) -> FeedResult<SequenceNumber> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn fetch_diff(&self, sequence: SequenceNumber) -> FeedResult<DiffBody> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&sequence).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(sequence);
        let payload = self
            .diffs
            .lock()
            .unwrap()
            .get(&sequence)
            .cloned()
            .ok_or(FeedError::DiffNotFound { sequence })?;
        Ok(Box::new(Cursor::new(payload)))
    }
}

/// Changeset `n` is authored by user `n % 10`; user 9 is a deleted account
#[derive(Default)]
pub struct FakeOsm {
    pub changeset_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
}

#[async_trait]
impl ChangesetApi for FakeOsm {
    async fn changeset(&self, id: ChangesetId) -> FeedResult<ChangesetDetails> {
        self.changeset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChangesetDetails {
            id,
            author_id: id.0 % 10,
            author_name: format!("mapper{}", id.0 % 10),
            edit_count: id.0 + 1,
            comment: Some(format!("changeset {}", id)),
        })
    }

    async fn profile_image(&self, uid: UserId) -> Result<Option<String>, ProfileLookupError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if uid == 9 {
            return Err(ProfileLookupError {
                uid,
                reason: "OSM API error: 410 Gone".to_string(),
            });
        }
        Ok(Some(format!("https://img.example/{}.png", uid)))
    }
}

/// Records every accepted message
///
/// Sends fail while `failing` is set, and the send whose 1-based attempt
/// number equals `fail_attempt` fails once.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<WebhookMessage>>,
    pub failing: AtomicBool,
    pub fail_attempt: AtomicUsize,
    pub rate_limit_next: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl RecordingNotifier {
    /// Titles (changeset ids) of all delivered embeds, in delivery order
    pub fn delivered(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .flat_map(|m| m.embeds.iter().map(|e| e.title.clone()))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &WebhookMessage) -> FeedResult<SendOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst)
            || attempt == self.fail_attempt.load(Ordering::SeqCst)
        {
            return Err(FeedError::DeliveryFailure {
                status: Some(500),
                reason: "webhook unavailable".to_string(),
            });
        }
        if self
            .rate_limit_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(SendOutcome::RateLimited {
                retry_after: Duration::from_secs(2),
            });
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(SendOutcome::Delivered)
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub struct Harness {
    pub engine: Arc<FeedEngine>,
    pub source: Arc<FakeReplication>,
    pub osm: Arc<FakeOsm>,
    pub notifier: Arc<RecordingNotifier>,
    pub sleeper: Arc<RecordingSleeper>,
    pub settings_path: std::path::PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub fn new(last: Option<SequenceNumber>, source: FakeReplication, limits: EngineLimits) -> Self {
        Self::with_chunk_size(last, source, limits, 10)
    }

    pub fn with_chunk_size(
        last: Option<SequenceNumber>,
        source: FakeReplication,
        limits: EngineLimits,
        chunk_size: usize,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let settings = serde_json::json!({
            "last": last,
            "webhookUrl": "https://hooks.example/feed",
            "bounds": region(),
        });
        std::fs::write(&settings_path, settings.to_string()).unwrap();

        let source = Arc::new(source);
        let osm = Arc::new(FakeOsm::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let sleeper = Arc::new(RecordingSleeper::default());

        let engine = FeedEngine::new(
            source.clone(),
            Arc::new(region()),
            Enricher::new(osm.clone()),
            Dispatcher::new(
                notifier.clone(),
                sleeper.clone(),
                OsmLinks::new(Url::parse("https://www.openstreetmap.org/").unwrap()),
                chunk_size,
            ),
            CheckpointStore::load(&settings_path).unwrap(),
            limits,
        );

        Self {
            engine: Arc::new(engine),
            source,
            osm,
            notifier,
            sleeper,
            settings_path,
            _dir: dir,
        }
    }

    /// Checkpoint as persisted on disk
    pub fn persisted_checkpoint(&self) -> Option<SequenceNumber> {
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&self.settings_path).unwrap()).unwrap();
        raw["last"].as_u64()
    }
}

pub fn limits(max_batch_width: u64) -> EngineLimits {
    EngineLimits {
        max_batch_width,
        fetch_concurrency: max_batch_width as usize,
        enrich_concurrency: 4,
    }
}
