//! Ordered, rate-limit aware delivery of enriched changes
//!
//! Changes are packed into messages of `chunk_size` embeds and sent strictly
//! one after another: chunk N+1 is not sent until chunk N was accepted. A
//! rate-limited chunk waits for the server-provided delay and is sent again,
//! as often as the server asks. Any other failure aborts delivery.

use super::types::{ChangesetId, EnrichedChange};
use super::webhook::{Embed, EmbedAuthor, EmbedFooter, Notifier, SendOutcome, WebhookMessage};
use crate::error::FeedResult;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// Suspends the current send; swapped out in tests to avoid real waiting
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Builds website links for changesets and users
#[derive(Debug, Clone)]
pub struct OsmLinks {
    web_base: Url,
}

impl OsmLinks {
    pub fn new(web_base: Url) -> Self {
        Self { web_base }
    }

    pub fn changeset(&self, id: ChangesetId) -> String {
        self.with_segments(&["changeset", &id.to_string()])
    }

    /// User page; the name is percent-encoded as a single path segment
    pub fn user(&self, name: &str) -> String {
        self.with_segments(&["user", name])
    }

    fn with_segments(&self, segments: &[&str]) -> String {
        let mut url = self.web_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}

/// Format one change as an embed
pub fn format_embed(change: &EnrichedChange, links: &OsmLinks, color: u32) -> Embed {
    Embed {
        title: change.changeset.to_string(),
        description: change.comment.clone(),
        url: links.changeset(change.changeset),
        color,
        timestamp: change.timestamp,
        author: EmbedAuthor {
            name: change.author_name.clone(),
            url: links.user(&change.author_name),
            icon_url: change.author_image.clone(),
        },
        footer: EmbedFooter {
            text: format!("{} changes", change.edit_count),
        },
    }
}

fn random_color() -> u32 {
    rand::thread_rng().gen_range(0..=0xFF_FFFF)
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    sleeper: Arc<dyn Sleeper>,
    links: OsmLinks,
    chunk_size: usize,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        sleeper: Arc<dyn Sleeper>,
        links: OsmLinks,
        chunk_size: usize,
    ) -> Self {
        Self {
            notifier,
            sleeper,
            links,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Deliver `changes` in order; returns the number of messages sent
    pub async fn deliver(&self, changes: &[EnrichedChange]) -> FeedResult<usize> {
        let mut sent = 0;

        for chunk in changes.chunks(self.chunk_size) {
            let message = WebhookMessage {
                content: None,
                embeds: chunk
                    .iter()
                    .map(|change| format_embed(change, &self.links, random_color()))
                    .collect(),
            };
            self.send_chunk(&message).await?;
            sent += 1;
        }

        Ok(sent)
    }

    async fn send_chunk(&self, message: &WebhookMessage) -> FeedResult<()> {
        let mut throttled = 0u32;
        loop {
            match self.notifier.send(message).await? {
                SendOutcome::Delivered => return Ok(()),
                SendOutcome::RateLimited { retry_after } => {
                    throttled += 1;
                    log::warn!(
                        "⏳ Webhook rate limit, waiting {:?} (attempt {}, first changeset {})",
                        retry_after,
                        throttled,
                        message
                            .embeds
                            .first()
                            .map(|e| e.title.as_str())
                            .unwrap_or("-")
                    );
                    self.sleeper.sleep(retry_after).await;
                }
            }
        }
    }
}
