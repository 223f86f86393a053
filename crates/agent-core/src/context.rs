//! Action Context
//!
//! Key-value state shared by the tools of one agent run. The context is a
//! cheap handle onto a [`ContextStore`]; clones see the same data.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Storage backend behind an [`ActionContext`]
///
/// Implementations must serialize writes: `set` and `update` are atomic with
/// respect to other writers of the same key.
pub trait ContextStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, returning the one it replaced
    fn set(&self, key: &str, value: Value) -> Option<Value>;

    /// Remove a value, returning it if present
    fn delete(&self, key: &str) -> Option<Value>;

    /// All entries, ordered by key
    fn list(&self) -> Vec<(String, Value)>;

    /// Atomic read-modify-write. `f` receives the current value and returns
    /// the new one; returning `None` removes the key.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Value>) -> Option<Value>) -> Option<Value>;
}

/// In-memory store (default backend)
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }
}

impl ContextStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.entries.write().insert(key.to_string(), value)
    }

    fn delete(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    fn list(&self) -> Vec<(String, Value)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Value>) -> Option<Value>) -> Option<Value> {
        let mut entries = self.entries.write();
        let next = f(entries.get(key).cloned());
        match &next {
            Some(value) => {
                entries.insert(key.to_string(), value.clone());
            }
            None => {
                entries.remove(key);
            }
        }
        next
    }
}

/// Context object handed to every tool invocation
#[derive(Clone)]
pub struct ActionContext {
    store: Arc<dyn ContextStore>,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionContext {
    /// Empty context over an in-memory store
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Context pre-populated with initial data
    pub fn with_data(initial: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::with_store(Arc::new(MemoryStore::with_entries(initial)))
    }

    /// Context over a caller-provided backend
    pub fn with_store(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    /// Read a value, falling back to `default` when the key is absent
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.store.get(key).unwrap_or(default)
    }

    /// Write a value (last write wins). Returns the previous value.
    pub fn set(&self, key: impl AsRef<str>, value: Value) -> Option<Value> {
        self.store.set(key.as_ref(), value)
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.store.delete(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.list().into_iter().map(|(k, _)| k).collect()
    }

    pub fn list(&self) -> Vec<(String, Value)> {
        self.store.list()
    }

    pub fn len(&self) -> usize {
        self.store.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic read-modify-write on a single key
    pub fn update<F>(&self, key: &str, mut f: F) -> Option<Value>
    where
        F: FnMut(Option<Value>) -> Option<Value>,
    {
        self.store.update(key, &mut f)
    }

    /// Whether two handles share the same backend
    pub fn shares_store_with(&self, other: &ActionContext) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.store.list()).finish()
    }
}
