//! Event-driven invalidation.
//!
//! Application code triggers named events (`"user.updated"`, ...); the
//! strategy records them, runs registered handlers, and deletes the event's
//! keys plus any additional keys the handlers return. One failing handler
//! never blocks the others or the deletions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use indexmap::IndexSet;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use tiercache_core::{Result, time::now_utc};

use crate::registry::CacheRegistry;

use super::delete_qualified;

const EVENT_HISTORY_LIMIT: usize = 1_000;

/// A recorded invalidation event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub event_type: String,
    /// Qualified keys (`cache:key`) named directly by the trigger.
    pub keys: Vec<String>,
    /// Tags to invalidate along with the event.
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: Option<String>,
    pub metadata: Option<Value>,
}

/// Handler invoked on a matching event. Returns additional qualified keys
/// to delete.
pub type EventHandler = dyn Fn(&InvalidationEvent) -> Result<Vec<String>> + Send + Sync;

struct RegisteredHandler {
    name: String,
    handler: Box<EventHandler>,
}

#[derive(Default)]
struct EventState {
    /// event_type -> handlers, in registration order.
    handlers: HashMap<String, Vec<RegisteredHandler>>,
    history: VecDeque<InvalidationEvent>,
}

/// Event registration, dispatch, and bounded history.
#[derive(Default)]
pub struct EventStrategy {
    state: Mutex<EventState>,
}

impl std::fmt::Debug for EventStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventStrategy")
            .field("event_types", &state.handlers.keys().collect::<Vec<_>>())
            .field("history_len", &state.history.len())
            .finish()
    }
}

impl EventStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a named handler for one event type. Handler names are
    /// informational (logging, listing) and need not be unique.
    pub fn register_handler<F>(&self, event_type: &str, name: &str, handler: F)
    where
        F: Fn(&InvalidationEvent) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state
            .handlers
            .entry(event_type.to_string())
            .or_default()
            .push(RegisteredHandler {
                name: name.to_string(),
                handler: Box::new(handler),
            });
        tracing::debug!(event_type = %event_type, handler = %name, "registered event handler");
    }

    /// Record the event, run its handlers, and delete the union of event
    /// keys and handler-returned keys. Returns the number of distinct
    /// qualified keys processed.
    pub async fn trigger(&self, registry: &CacheRegistry, event: InvalidationEvent) -> usize {
        let mut keys: IndexSet<String> = event.keys.iter().cloned().collect();

        {
            let mut state = self.lock();
            state.history.push_back(event.clone());
            while state.history.len() > EVENT_HISTORY_LIMIT {
                state.history.pop_front();
            }

            if let Some(handlers) = state.handlers.get(&event.event_type) {
                for registered in handlers {
                    match (registered.handler)(&event) {
                        Ok(extra) => keys.extend(extra),
                        Err(err) => {
                            tracing::warn!(
                                event_type = %event.event_type,
                                handler = %registered.name,
                                error = %err,
                                "event handler failed; continuing"
                            );
                        }
                    }
                }
            }
        }

        let mut deleted = 0usize;
        for key in &keys {
            if delete_qualified(registry, key).await {
                deleted += 1;
            }
        }
        tracing::info!(
            event_type = %event.event_type,
            keys = keys.len(),
            deleted,
            "processed invalidation event"
        );
        keys.len()
    }

    /// Most recent events, newest first, up to `limit`.
    pub fn history(&self, limit: usize) -> Vec<InvalidationEvent> {
        self.lock().history.iter().rev().take(limit).cloned().collect()
    }

    /// Handler names registered for an event type, in registration order.
    pub fn handler_names(&self, event_type: &str) -> Vec<String> {
        self.lock()
            .handlers
            .get(event_type)
            .map(|handlers| handlers.iter().map(|h| h.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl InvalidationEvent {
    /// Event with just a type and direct keys.
    pub fn new(event_type: &str, keys: Vec<String>) -> Self {
        Self {
            event_type: event_type.to_string(),
            keys,
            tags: Vec::new(),
            timestamp: now_utc(),
            source: None,
            metadata: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiercache_core::{CacheError, TierCacheConfig};

    async fn seeded_registry() -> CacheRegistry {
        let registry = CacheRegistry::new(TierCacheConfig::default()).unwrap();
        registry.create_default("users").unwrap();
        registry.put("users", "1", json!("ada"), None).await.unwrap();
        registry.put("users", "1:profile", json!({"bio": "x"}), None).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn test_trigger_deletes_event_keys() {
        let registry = seeded_registry().await;
        let events = EventStrategy::new();

        let processed = events
            .trigger(&registry, InvalidationEvent::new("user.updated", vec!["users:1".into()]))
            .await;
        assert_eq!(processed, 1);
        assert_eq!(registry.fetch("users", "1").await, None);
    }

    #[tokio::test]
    async fn test_handlers_expand_the_key_set() {
        let registry = seeded_registry().await;
        let events = EventStrategy::new();
        events.register_handler("user.updated", "profile-sweeper", |event| {
            Ok(event
                .keys
                .iter()
                .map(|key| format!("{key}:profile"))
                .collect())
        });

        let processed = events
            .trigger(&registry, InvalidationEvent::new("user.updated", vec!["users:1".into()]))
            .await;
        assert_eq!(processed, 2);
        assert_eq!(registry.fetch("users", "1:profile").await, None);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let registry = seeded_registry().await;
        let events = EventStrategy::new();
        events.register_handler("user.updated", "broken", |_| {
            Err(CacheError::handler_failure("broken", "boom"))
        });
        events.register_handler("user.updated", "working", |_| {
            Ok(vec!["users:1:profile".to_string()])
        });

        let processed = events
            .trigger(&registry, InvalidationEvent::new("user.updated", vec!["users:1".into()]))
            .await;
        assert_eq!(processed, 2);
        assert_eq!(registry.fetch("users", "1").await, None);
        assert_eq!(registry.fetch("users", "1:profile").await, None);
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let registry = CacheRegistry::new(TierCacheConfig::default()).unwrap();
        let events = EventStrategy::new();
        for i in 0..3 {
            events
                .trigger(&registry, InvalidationEvent::new(&format!("e{i}"), vec![]))
                .await;
        }
        let history = events.history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type, "e2");
        assert_eq!(history[1].event_type, "e1");
    }

    #[test]
    fn test_handler_names() {
        let events = EventStrategy::new();
        events.register_handler("e", "first", |_| Ok(vec![]));
        events.register_handler("e", "second", |_| Ok(vec![]));
        assert_eq!(events.handler_names("e"), vec!["first", "second"]);
        assert!(events.handler_names("other").is_empty());
    }
}
