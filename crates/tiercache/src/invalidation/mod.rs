//! Invalidation strategies: tags, events, and dependency cascades.
//!
//! All strategies address entries through qualified keys (`cache:key`) so a
//! single tag or dependency edge can span caches. [`CacheInvalidator`] is
//! the façade that owns the three strategies and the registry handle.

mod deps;
mod events;
mod tags;

pub use deps::DependencyStrategy;
pub use events::{EventStrategy, InvalidationEvent};
pub use tags::{CacheTag, TagStrategy};

use std::sync::Arc;

use tiercache_core::Result;

use crate::registry::CacheRegistry;

/// Build a qualified key from a cache name and key.
pub fn qualify(cache: &str, key: &str) -> String {
    format!("{cache}:{key}")
}

/// Split a qualified key at the first `:`. Keys may contain further colons.
pub fn split_qualified(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once(':')
}

/// Delete a qualified key through the registry. Malformed keys are logged
/// and skipped.
pub(crate) async fn delete_qualified(registry: &CacheRegistry, qualified: &str) -> bool {
    match split_qualified(qualified) {
        Some((cache, key)) => registry.delete(cache, key).await,
        None => {
            tracing::warn!(key = %qualified, "qualified key without cache prefix skipped");
            false
        }
    }
}

/// Façade over the three invalidation strategies.
#[derive(Debug)]
pub struct CacheInvalidator {
    registry: Arc<CacheRegistry>,
    tags: TagStrategy,
    events: EventStrategy,
    // Shared with cascade event handlers.
    deps: Arc<DependencyStrategy>,
}

impl CacheInvalidator {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self {
            registry,
            tags: TagStrategy::new(),
            events: EventStrategy::new(),
            deps: Arc::new(DependencyStrategy::new()),
        }
    }

    /// Store a value and attach tags to it in one call.
    pub async fn tag_on_write(
        &self,
        cache: &str,
        key: &str,
        value: serde_json::Value,
        tags: &[String],
        ttl: Option<std::time::Duration>,
    ) -> Result<()> {
        self.registry.put(cache, key, value, ttl).await?;
        self.tags.tag_keys(tags, &qualify(cache, key));
        Ok(())
    }

    /// Attach tags to an already-cached entry.
    pub fn tag_existing(&self, cache: &str, key: &str, tags: &[String]) {
        self.tags.tag_keys(tags, &qualify(cache, key));
    }

    /// Invalidate every key carrying any of the tags. Returns total keys
    /// processed.
    pub async fn invalidate_by_tags(&self, tags: &[String], reason: Option<&str>) -> usize {
        tracing::debug!(
            tags = ?tags,
            reason = reason.unwrap_or("unspecified"),
            "tag invalidation requested"
        );
        let mut processed = 0usize;
        for tag in tags {
            processed += self.tags.invalidate_tag(&self.registry, tag).await;
        }
        processed
    }

    /// Trigger an event: run handlers, delete the event's keys, and
    /// invalidate the event's tags. Returns total keys processed.
    pub async fn invalidate_by_event(&self, event: InvalidationEvent) -> usize {
        let tags = event.tags.clone();
        let reason = event.event_type.clone();
        let mut processed = self.events.trigger(&self.registry, event).await;
        processed += self.invalidate_by_tags(&tags, Some(&reason)).await;
        processed
    }

    /// Invalidate every transitive dependent of a changed key. The changed
    /// key's fresh value stays in place.
    pub async fn invalidate_by_dependency(
        &self,
        cache: &str,
        key: &str,
        reason: Option<&str>,
    ) -> usize {
        tracing::debug!(
            cache = %cache,
            key = %key,
            reason = reason.unwrap_or("unspecified"),
            "dependency invalidation requested"
        );
        self.deps
            .invalidate_dependents(&self.registry, &qualify(cache, key))
            .await
    }

    /// Declare `(cache, key)` stale whenever `(dep_cache, dep_key)` changes.
    pub fn add_dependency(&self, cache: &str, key: &str, dep_cache: &str, dep_key: &str) {
        self.deps
            .add_dependency(&qualify(cache, key), &qualify(dep_cache, dep_key));
    }

    /// Register a named handler for an event type.
    pub fn register_handler<F>(&self, event_type: &str, name: &str, handler: F)
    where
        F: Fn(&InvalidationEvent) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        self.events.register_handler(event_type, name, handler);
    }

    /// Wire an event type so that each of the event's keys also cascades
    /// through the dependency graph.
    pub fn wire_dependency_cascade(&self, event_type: &str) {
        let graph = Arc::clone(&self.deps);
        self.events.register_handler(event_type, "dependency-cascade", move |event| {
            let mut extra = Vec::new();
            for key in &event.keys {
                extra.extend(graph.collect_cascade(key));
            }
            Ok(extra)
        });
    }

    /// Forget tag memberships and dependency edges for an explicitly
    /// deleted entry.
    pub fn forget(&self, cache: &str, key: &str) {
        let qualified = qualify(cache, key);
        self.tags.forget_key(&qualified);
        self.deps.forget_key(&qualified);
    }

    pub fn tags_for(&self, cache: &str, key: &str) -> Vec<String> {
        self.tags.tags_for_key(&qualify(cache, key))
    }

    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.tags.keys_for_tag(tag)
    }

    pub fn list_tags(&self) -> Vec<CacheTag> {
        self.tags.list_tags()
    }

    pub fn event_history(&self, limit: usize) -> Vec<InvalidationEvent> {
        self.events.history(limit)
    }

    pub fn dependents_of(&self, cache: &str, key: &str) -> Vec<String> {
        self.deps.dependents_of(&qualify(cache, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiercache_core::TierCacheConfig;

    async fn invalidator() -> CacheInvalidator {
        let registry = Arc::new(CacheRegistry::new(TierCacheConfig::default()).unwrap());
        registry.create_default("users").unwrap();
        registry.create_default("views").unwrap();
        registry.put("users", "1", json!("ada"), None).await.unwrap();
        registry.put("views", "home", json!("<html>"), None).await.unwrap();
        CacheInvalidator::new(registry)
    }

    #[test]
    fn test_qualified_keys_split_at_first_colon() {
        assert_eq!(qualify("users", "1:profile"), "users:1:profile");
        assert_eq!(split_qualified("users:1:profile"), Some(("users", "1:profile")));
        assert_eq!(split_qualified("nocolon"), None);
    }

    #[tokio::test]
    async fn test_tag_then_invalidate() {
        let inv = invalidator().await;
        inv.tag_existing("users", "1", &["user-1".to_string()]);
        inv.tag_existing("views", "home", &["user-1".to_string()]);

        let processed = inv
            .invalidate_by_tags(&["user-1".to_string()], Some("user deleted"))
            .await;
        assert_eq!(processed, 2);
        assert_eq!(inv.registry.fetch("users", "1").await, None);
        assert_eq!(inv.registry.fetch("views", "home").await, None);
    }

    #[tokio::test]
    async fn test_tag_on_write_stores_and_tags() {
        let inv = invalidator().await;
        inv.tag_on_write("users", "2", json!("grace"), &["user-2".to_string()], None)
            .await
            .unwrap();
        assert_eq!(inv.registry.fetch("users", "2").await, Some(json!("grace")));

        inv.invalidate_by_tags(&["user-2".to_string()], None).await;
        assert_eq!(inv.registry.fetch("users", "2").await, None);
    }

    #[tokio::test]
    async fn test_event_invalidates_its_tags_too() {
        let inv = invalidator().await;
        inv.tag_existing("views", "home", &["homepage".to_string()]);

        let event = InvalidationEvent::new("user.updated", vec![qualify("users", "1")])
            .with_tags(vec!["homepage".to_string()]);
        let processed = inv.invalidate_by_event(event).await;
        assert_eq!(processed, 2);
        assert_eq!(inv.registry.fetch("users", "1").await, None);
        assert_eq!(inv.registry.fetch("views", "home").await, None);
        assert_eq!(inv.event_history(10).len(), 1);
    }

    #[tokio::test]
    async fn test_event_cascades_through_dependencies_when_wired() {
        let inv = invalidator().await;
        inv.add_dependency("views", "home", "users", "1");
        inv.wire_dependency_cascade("user.updated");

        let processed = inv
            .invalidate_by_event(InvalidationEvent::new("user.updated", vec![qualify("users", "1")]))
            .await;
        assert_eq!(processed, 2);
        assert_eq!(inv.registry.fetch("views", "home").await, None);
    }

    #[tokio::test]
    async fn test_forget_detaches_tags_and_edges() {
        let inv = invalidator().await;
        inv.tag_existing("users", "1", &["t".to_string()]);
        inv.add_dependency("views", "home", "users", "1");

        inv.forget("users", "1");
        assert!(inv.tags_for("users", "1").is_empty());
        assert!(inv.dependents_of("users", "1").is_empty());
    }
}
