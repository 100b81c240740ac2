//! Tag-based invalidation.
//!
//! A tag groups qualified keys (`cache:key`) across any number of caches.
//! Invalidating a tag deletes every member key and keeps the tag itself
//! around with its invalidation counter.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indexmap::IndexSet;
use serde::Serialize;
use time::OffsetDateTime;

use tiercache_core::time::now_utc;

use crate::registry::CacheRegistry;

use super::{delete_qualified, split_qualified};

/// A named tag and the keys currently attached to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTag {
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Qualified keys (`cache:key`) tagged with this tag.
    pub member_keys: IndexSet<String>,
    /// How many times this tag was invalidated.
    pub invalidation_count: u64,
}

#[derive(Debug, Default)]
struct TagState {
    tags: HashMap<String, CacheTag>,
    /// Reverse index: qualified key -> tag names.
    key_tags: HashMap<String, IndexSet<String>>,
}

/// Bidirectional tag/key index plus the invalidation operation.
#[derive(Debug, Default)]
pub struct TagStrategy {
    state: Mutex<TagState>,
}

impl TagStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a qualified key to a tag, creating the tag on first use.
    pub fn tag_key(&self, tag: &str, qualified_key: &str) {
        let mut state = self.lock();
        state
            .tags
            .entry(tag.to_string())
            .or_insert_with(|| CacheTag {
                name: tag.to_string(),
                description: None,
                created_at: now_utc(),
                member_keys: IndexSet::new(),
                invalidation_count: 0,
            })
            .member_keys
            .insert(qualified_key.to_string());
        state
            .key_tags
            .entry(qualified_key.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    /// Attach a qualified key to several tags at once.
    pub fn tag_keys(&self, tags: &[String], qualified_key: &str) {
        for tag in tags {
            self.tag_key(tag, qualified_key);
        }
    }

    pub fn describe_tag(&self, tag: &str, description: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.tags.get_mut(tag) {
            entry.description = Some(description.to_string());
        }
    }

    /// Delete every key attached to a tag. Returns the number of keys
    /// processed; an unknown tag is 0, not an error.
    ///
    /// Membership is detached under the lock before any deletion, so a
    /// concurrent re-tag of the same key lands in the next invalidation.
    pub async fn invalidate_tag(&self, registry: &CacheRegistry, tag: &str) -> usize {
        let members: Vec<String> = {
            let mut state = self.lock();
            let Some(entry) = state.tags.get_mut(tag) else {
                tracing::debug!(tag = %tag, "invalidation of unknown tag ignored");
                return 0;
            };
            entry.invalidation_count += 1;
            let members: Vec<String> = std::mem::take(&mut entry.member_keys).into_iter().collect();

            // The values are about to be deleted, so membership in every
            // other tag is stale too.
            for key in &members {
                if let Some(other_tags) = state.key_tags.remove(key) {
                    for other in other_tags {
                        if other == tag {
                            continue;
                        }
                        if let Some(entry) = state.tags.get_mut(&other) {
                            entry.member_keys.shift_remove(key);
                        }
                    }
                }
            }
            members
        };

        let mut deleted = 0usize;
        for key in &members {
            if delete_qualified(registry, key).await {
                deleted += 1;
            }
        }
        tracing::info!(tag = %tag, keys = members.len(), deleted, "invalidated tag");
        members.len()
    }

    /// Detach a key from every tag it belongs to (for explicit deletes).
    pub fn forget_key(&self, qualified_key: &str) {
        let mut state = self.lock();
        if let Some(tags) = state.key_tags.remove(qualified_key) {
            for tag in tags {
                if let Some(entry) = state.tags.get_mut(&tag) {
                    entry.member_keys.shift_remove(qualified_key);
                }
            }
        }
    }

    /// Remove a tag entirely, detaching its keys. Values are untouched.
    pub fn remove_tag(&self, tag: &str) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.tags.remove(tag) else {
            return false;
        };
        for key in &entry.member_keys {
            if let Some(tags) = state.key_tags.get_mut(key) {
                tags.shift_remove(tag);
                if tags.is_empty() {
                    state.key_tags.remove(key);
                }
            }
        }
        true
    }

    pub fn tags_for_key(&self, qualified_key: &str) -> Vec<String> {
        self.lock()
            .key_tags
            .get(qualified_key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.lock()
            .tags
            .get(tag)
            .map(|entry| entry.member_keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_tags(&self) -> Vec<CacheTag> {
        let mut tags: Vec<CacheTag> = self.lock().tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    /// Qualified keys from a tag that live in a specific cache.
    pub fn keys_for_tag_in_cache(&self, tag: &str, cache: &str) -> Vec<String> {
        self.keys_for_tag(tag)
            .into_iter()
            .filter(|key| split_qualified(key).is_some_and(|(c, _)| c == cache))
            .collect()
    }
}
