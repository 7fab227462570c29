//! Process-lifetime cache of author profile images
//!
//! Each author is looked up at most once per process in the common case.
//! `None` is a real cached answer (no image, deleted account, or a failed
//! lookup). Two overlapping misses for the same author may both go upstream;
//! the second insert simply overwrites the first.
//!
//! Entries are never evicted.

use super::types::UserId;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: Mutex<HashMap<UserId, Option<String>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(entry)` on a hit, where `entry` itself may be a cached `None`
    pub fn get(&self, uid: UserId) -> Option<Option<String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&uid)
            .cloned()
    }

    pub fn insert(&self, uid: UserId, image: Option<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(uid, image);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
