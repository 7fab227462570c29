//! diffwatch runtime
//!
//! Loads the settings file, wires the replication feed, OSM API and webhook
//! clients into a `FeedEngine`, and triggers it on a fixed interval.
//!
//! Usage:
//!   cargo run --release --bin diffwatch
//!
//! Environment variables (see `FeedConfig::from_env` for the full list):
//!   DIFFWATCH_SETTINGS_PATH - Settings file (default: settings.json)
//!   WEBHOOK_URL - Overrides `webhookUrl` from the settings file
//!   MAX_BATCH_WIDTH - Sequences per batch (default: 5)
//!   POLL_INTERVAL_SECS - Trigger interval (default: 60)

use diffwatch::config::{ConfigError, FeedConfig};
use diffwatch::http::HttpClient;
use diffwatch::persistence::CheckpointStore;
use diffwatch::pipeline::{
    scheduler::feed_scheduler_task, Dispatcher, EngineLimits, Enricher, FeedEngine, OsmClient,
    OsmLinks, ReplicationClient, TokioSleeper, WebhookNotifier,
};
use diffwatch::region::RegionTest;
use dotenv::dotenv;
use log::{error, info};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting diffwatch...");

    let config = FeedConfig::from_env()?;
    let store = CheckpointStore::load(&config.settings_path)?;
    let settings = store.settings();

    let webhook_url = config
        .webhook_url
        .clone()
        .or(settings.webhook_url)
        .ok_or_else(|| ConfigError::MissingVariable("WEBHOOK_URL or webhookUrl".to_string()))?;
    let webhook_url = Url::parse(&webhook_url)
        .map_err(|e| ConfigError::InvalidValue(format!("webhook URL: {}", e)))?;

    let bounds = settings
        .bounds
        .ok_or_else(|| ConfigError::MissingVariable("bounds".to_string()))?;
    bounds.validate().map_err(ConfigError::InvalidValue)?;

    info!("📊 Configuration:");
    info!("   ├─ Settings: {}", store.path().display());
    info!("   ├─ Replication: {}", config.replication_url);
    info!("   ├─ OSM API: {}", config.api_url);
    info!(
        "   ├─ Bounds: top={} bottom={} left={} right={}",
        bounds.top, bounds.bottom, bounds.left, bounds.right
    );
    info!(
        "   ├─ Batch width: {} (fetch concurrency {})",
        config.max_batch_width, config.fetch_concurrency
    );
    info!("   ├─ Chunk size: {}", config.delivery_chunk_size);
    info!("   └─ Poll interval: {:?}", config.poll_interval);

    let http = HttpClient::new(config.http_timeout, config.http_max_retries)?;
    let region: Arc<dyn RegionTest> = Arc::new(bounds);

    let engine = Arc::new(FeedEngine::new(
        Arc::new(ReplicationClient::new(
            http.clone(),
            config.replication_url.clone(),
        )),
        region,
        Enricher::new(Arc::new(OsmClient::new(http.clone(), config.api_url.clone()))),
        Dispatcher::new(
            Arc::new(WebhookNotifier::new(http, webhook_url)),
            Arc::new(TokioSleeper),
            OsmLinks::new(config.web_url.clone()),
            config.delivery_chunk_size,
        ),
        store,
        EngineLimits {
            max_batch_width: config.max_batch_width,
            fetch_concurrency: config.fetch_concurrency,
            enrich_concurrency: config.enrich_concurrency,
        },
    ));

    let scheduler = tokio::spawn(feed_scheduler_task(engine.clone(), config.poll_interval));
    info!("✅ Feed scheduler running");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    scheduler.abort();

    // Let an in-flight batch finish; an interrupted one is redelivered next start
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while engine.is_busy() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    if engine.is_busy() {
        info!("⚠️  Batch still running at shutdown, it will be redelivered");
    }

    info!("✅ diffwatch stopped");
    Ok(())
}
