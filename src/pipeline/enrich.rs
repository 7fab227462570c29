//! Metadata enrichment for filtered changesets
//!
//! One changeset lookup per filtered change (fatal on failure, a change
//! cannot be reported without its author), plus a cached profile image
//! lookup per author (never fatal).

use super::osm::ChangesetApi;
use super::profile_cache::ProfileCache;
use super::types::{EnrichedChange, FilteredChange, UserId, NO_COMMENT};
use crate::error::FeedResult;
use std::sync::Arc;

pub struct Enricher {
    api: Arc<dyn ChangesetApi>,
    profiles: ProfileCache,
}

impl Enricher {
    pub fn new(api: Arc<dyn ChangesetApi>) -> Self {
        Self {
            api,
            profiles: ProfileCache::new(),
        }
    }

    pub fn profile_cache(&self) -> &ProfileCache {
        &self.profiles
    }

    pub async fn enrich(&self, change: FilteredChange) -> FeedResult<EnrichedChange> {
        let details = self.api.changeset(change.changeset).await?;
        let author_image = self.resolve_profile_image(details.author_id).await;

        Ok(EnrichedChange {
            changeset: change.changeset,
            author_id: details.author_id,
            author_name: details.author_name,
            edit_count: details.edit_count,
            comment: details.comment.unwrap_or_else(|| NO_COMMENT.to_string()),
            timestamp: change.timestamp,
            author_image,
        })
    }

    /// Cached profile image of `uid`; failures are logged and cached as `None`
    pub async fn resolve_profile_image(&self, uid: UserId) -> Option<String> {
        if let Some(cached) = self.profiles.get(uid) {
            log::debug!("Using cached profile image for {}", uid);
            return cached;
        }

        let image = match self.api.profile_image(uid).await {
            Ok(image) => {
                log::debug!("Cached profile image for {} as {:?}", uid, image);
                image
            }
            Err(e) => {
                log::warn!("⚠️  Could not get profile image: {}", e);
                None
            }
        };

        self.profiles.insert(uid, image.clone());
        image
    }
}
