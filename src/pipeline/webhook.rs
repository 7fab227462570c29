//! Webhook message format and HTTP notifier
//!
//! Messages follow the Discord webhook shape: optional `content` plus up to
//! ten `embeds`. A 429 answer carries the wait in the JSON body
//! (`retry_after`, seconds) and usually in the `Retry-After` header too.

use crate::error::{FeedError, FeedResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait used when a 429 carries no usable delay
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub author: EmbedAuthor,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    RateLimited { retry_after: Duration },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &WebhookMessage) -> FeedResult<SendOutcome>;
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Delay requested by a rate-limited response
///
/// Prefers the body's `retry_after`, then the `Retry-After` header, then
/// [`DEFAULT_RETRY_AFTER`].
pub fn parse_retry_after(body: &str, header: Option<&str>) -> Duration {
    let from_body = serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| Duration::try_from_secs_f64(b.retry_after).ok());
    let from_header = || {
        header
            .and_then(|h| h.trim().parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    };
    from_body.or_else(from_header).unwrap_or(DEFAULT_RETRY_AFTER)
}

pub struct WebhookNotifier {
    http: HttpClient,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &WebhookMessage) -> FeedResult<SendOutcome> {
        let response = self
            .http
            .post_json(&self.url, message)
            .await
            .map_err(|e| FeedError::DeliveryFailure {
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(SendOutcome::Delivered);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let header = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Ok(SendOutcome::RateLimited {
                retry_after: parse_retry_after(&body, header.as_deref()),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(FeedError::DeliveryFailure {
            status: Some(status.as_u16()),
            reason: body,
        })
    }
}
