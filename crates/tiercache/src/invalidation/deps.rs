//! Dependency-based invalidation.
//!
//! Qualified keys form a directed graph: `add_dependency(key, depends_on)`
//! means invalidating `depends_on` must also invalidate `key`. Cascades
//! follow the reverse edges transitively; a visited set makes cycles
//! terminate.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indexmap::IndexSet;

use crate::registry::CacheRegistry;

use super::delete_qualified;

#[derive(Debug, Default)]
struct DepState {
    /// key -> keys it depends on.
    depends_on: HashMap<String, IndexSet<String>>,
    /// key -> keys that depend on it (reverse edges).
    dependents: HashMap<String, IndexSet<String>>,
}

/// Dependency graph over qualified keys.
#[derive(Debug, Default)]
pub struct DependencyStrategy {
    state: Mutex<DepState>,
}

impl DependencyStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DepState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare that `key` depends on `depends_on`.
    pub fn add_dependency(&self, key: &str, depends_on: &str) {
        if key == depends_on {
            tracing::debug!(key = %key, "self-dependency ignored");
            return;
        }
        let mut state = self.lock();
        state
            .depends_on
            .entry(key.to_string())
            .or_default()
            .insert(depends_on.to_string());
        state
            .dependents
            .entry(depends_on.to_string())
            .or_default()
            .insert(key.to_string());
    }

    pub fn remove_dependency(&self, key: &str, depends_on: &str) {
        let mut state = self.lock();
        if let Some(deps) = state.depends_on.get_mut(key) {
            deps.shift_remove(depends_on);
            if deps.is_empty() {
                state.depends_on.remove(key);
            }
        }
        if let Some(deps) = state.dependents.get_mut(depends_on) {
            deps.shift_remove(key);
            if deps.is_empty() {
                state.dependents.remove(depends_on);
            }
        }
    }

    /// Drop every edge touching a key (for explicit deletes).
    pub fn forget_key(&self, key: &str) {
        let mut state = self.lock();
        if let Some(deps) = state.depends_on.remove(key) {
            for dep in deps {
                if let Some(set) = state.dependents.get_mut(&dep) {
                    set.shift_remove(key);
                    if set.is_empty() {
                        state.dependents.remove(&dep);
                    }
                }
            }
        }
        if let Some(dependents) = state.dependents.remove(key) {
            for dependent in dependents {
                if let Some(set) = state.depends_on.get_mut(&dependent) {
                    set.shift_remove(key);
                    if set.is_empty() {
                        state.depends_on.remove(&dependent);
                    }
                }
            }
        }
    }

    /// Direct dependencies of a key.
    pub fn dependencies_of(&self, key: &str) -> Vec<String> {
        self.lock()
            .depends_on
            .get(key)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a key.
    pub fn dependents_of(&self, key: &str) -> Vec<String> {
        self.lock()
            .dependents
            .get(key)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive closure of dependents, excluding the root. Computed
    /// under one lock; cycles terminate through the visited set.
    pub fn collect_cascade(&self, root: &str) -> Vec<String> {
        let state = self.lock();
        let mut visited: IndexSet<String> = IndexSet::new();
        let mut worklist = vec![root.to_string()];
        while let Some(key) = worklist.pop() {
            if let Some(dependents) = state.dependents.get(&key) {
                for dependent in dependents {
                    if visited.insert(dependent.clone()) {
                        worklist.push(dependent.clone());
                    }
                }
            }
        }
        visited.shift_remove(root);
        visited.into_iter().collect()
    }

    /// Delete every transitive dependent of a changed key. The changed
    /// key itself is left alone (its value was just refreshed); only the
    /// entries derived from it go. Returns the number of dependents
    /// processed.
    pub async fn invalidate_dependents(&self, registry: &CacheRegistry, changed: &str) -> usize {
        let keys = self.collect_cascade(changed);

        let mut deleted = 0usize;
        for key in &keys {
            if delete_qualified(registry, key).await {
                deleted += 1;
            }
        }
        tracing::info!(key = %changed, dependents = keys.len(), deleted, "invalidated dependents");
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiercache_core::TierCacheConfig;

    #[test]
    fn test_edges_are_bidirectional() {
        let deps = DependencyStrategy::new();
        deps.add_dependency("views:home", "users:1");
        assert_eq!(deps.dependencies_of("views:home"), vec!["users:1"]);
        assert_eq!(deps.dependents_of("users:1"), vec!["views:home"]);

        deps.remove_dependency("views:home", "users:1");
        assert!(deps.dependencies_of("views:home").is_empty());
        assert!(deps.dependents_of("users:1").is_empty());
    }

    #[test]
    fn test_cascade_is_transitive() {
        let deps = DependencyStrategy::new();
        deps.add_dependency("b", "a");
        deps.add_dependency("c", "b");
        deps.add_dependency("d", "c");

        let cascade = deps.collect_cascade("a");
        assert_eq!(cascade.len(), 3);
        assert!(cascade.contains(&"b".to_string()));
        assert!(cascade.contains(&"d".to_string()));
    }

    #[test]
    fn test_cycles_terminate() {
        let deps = DependencyStrategy::new();
        deps.add_dependency("b", "a");
        deps.add_dependency("a", "b");

        assert_eq!(deps.collect_cascade("a"), vec!["b"]);
        assert_eq!(deps.collect_cascade("b"), vec!["a"]);
    }

    #[test]
    fn test_self_dependency_ignored() {
        let deps = DependencyStrategy::new();
        deps.add_dependency("a", "a");
        assert!(deps.collect_cascade("a").is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_dependents_leaves_the_changed_key() {
        let registry = CacheRegistry::new(TierCacheConfig::default()).unwrap();
        registry.create_default("users").unwrap();
        registry.create_default("views").unwrap();
        registry.put("users", "1", json!("ada v2"), None).await.unwrap();
        registry.put("views", "home", json!("<html>"), None).await.unwrap();

        let deps = DependencyStrategy::new();
        deps.add_dependency("views:home", "users:1");

        let processed = deps.invalidate_dependents(&registry, "users:1").await;
        assert_eq!(processed, 1);
        // The changed key keeps its fresh value; only its dependents go.
        assert_eq!(registry.fetch("users", "1").await, Some(json!("ada v2")));
        assert_eq!(registry.fetch("views", "home").await, None);
    }

    #[test]
    fn test_forget_key_drops_all_edges() {
        let deps = DependencyStrategy::new();
        deps.add_dependency("b", "a");
        deps.add_dependency("a", "z");
        deps.forget_key("a");
        assert!(deps.dependents_of("a").is_empty());
        assert!(deps.dependencies_of("a").is_empty());
        assert!(deps.dependents_of("z").is_empty());
    }
}
