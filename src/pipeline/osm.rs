//! OpenStreetMap API integration
//!
//! Provides changeset metadata and author profile images:
//! - Changeset author (uid and display name)
//! - Number of edits in the changeset
//! - Changeset comment tag
//! - Author profile image URL
//!
//! ## API Reference
//!
//! Endpoints (relative to the API base, e.g. `https://api.openstreetmap.org/api/0.6/`):
//! - `changeset/{id}.json` - returns `{"elements": [ChangesetElement]}`
//! - `user/{uid}.json` - returns `{"user": {"img": {"href": ...}}}`; deleted
//!   accounts answer 410 Gone

use super::types::{ChangesetId, UserId};
use crate::error::{FeedError, FeedResult};
use crate::http::HttpClient;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Changeset response structure
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesetResponse {
    pub elements: Vec<ChangesetElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangesetElement {
    pub id: u64,
    pub user: String,
    pub uid: UserId,
    pub changes_count: u64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub user: UserDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDetails {
    pub img: Option<UserImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserImage {
    pub href: String,
}

/// Changeset metadata extracted from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetDetails {
    pub id: ChangesetId,
    pub author_id: UserId,
    pub author_name: String,
    pub edit_count: u64,
    pub comment: Option<String>,
}

impl From<ChangesetElement> for ChangesetDetails {
    fn from(mut element: ChangesetElement) -> Self {
        let comment = element
            .tags
            .remove("comment")
            .filter(|c| !c.trim().is_empty());
        Self {
            id: ChangesetId(element.id),
            author_id: element.uid,
            author_name: element.user,
            edit_count: element.changes_count,
            comment,
        }
    }
}

/// Profile lookup failure; never fatal, the notification goes out without an image
#[derive(Debug, Error)]
#[error("profile lookup for user {uid} failed: {reason}")]
pub struct ProfileLookupError {
    pub uid: UserId,
    pub reason: String,
}

#[async_trait]
pub trait ChangesetApi: Send + Sync {
    async fn changeset(&self, id: ChangesetId) -> FeedResult<ChangesetDetails>;

    /// Profile image of `uid`; `Ok(None)` when the user has none or is gone
    async fn profile_image(&self, uid: UserId) -> Result<Option<String>, ProfileLookupError>;
}

/// [`ChangesetApi`] backed by the OSM REST API
pub struct OsmClient {
    http: HttpClient,
    api_base: Url,
}

impl OsmClient {
    pub fn new(http: HttpClient, api_base: Url) -> Self {
        Self { http, api_base }
    }
}

#[async_trait]
impl ChangesetApi for OsmClient {
    async fn changeset(&self, id: ChangesetId) -> FeedResult<ChangesetDetails> {
        let lookup_failed = |reason: String| FeedError::EnrichmentLookup {
            changeset: id,
            reason,
        };

        let url = self
            .api_base
            .join(&format!("changeset/{}.json", id))
            .map_err(|e| lookup_failed(e.to_string()))?;

        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(lookup_failed(format!("OSM API error: {}", response.status())));
        }

        let body: ChangesetResponse = response
            .json()
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        let element = body
            .elements
            .into_iter()
            .next()
            .ok_or_else(|| lookup_failed("response contained no changeset".to_string()))?;

        Ok(element.into())
    }

    async fn profile_image(&self, uid: UserId) -> Result<Option<String>, ProfileLookupError> {
        let lookup_failed = |reason: String| ProfileLookupError { uid, reason };

        let url = self
            .api_base
            .join(&format!("user/{}.json", uid))
            .map_err(|e| lookup_failed(e.to_string()))?;

        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        match response.status() {
            StatusCode::GONE | StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(lookup_failed(format!("OSM API error: {}", status)))
            }
            _ => {}
        }

        let body: UserResponse = response
            .json()
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;

        Ok(body.user.img.map(|img| img.href))
    }
}
