//! Wrapper cache keyed by callable identity.
//!
//! While a call on a callable is outstanding, further wrap requests for the
//! same callable get the live wrapper back instead of a fresh one, so nested
//! and recursive calls are not double-timed. Entries are released when the
//! last outstanding call completes.

use std::sync::Arc;

use chronoscope_core::Value;
use dashmap::DashMap;

use crate::invoke::TimedFunction;

/// Identity of an object or function value.
///
/// Primitives have no identity.
pub fn identity(value: &Value) -> Option<usize> {
    match value {
        Value::Object(o) => Some(Arc::as_ptr(o) as *const () as usize),
        Value::Function(f) => Some(Arc::as_ptr(f) as *const () as usize),
        _ => None,
    }
}

struct CacheEntry {
    // Held strongly while calls are in flight; the wrapper also keeps the
    // callable alive, so its identity cannot be reused.
    wrapper: Arc<TimedFunction>,
    in_flight: usize,
}

/// Cache of live invocation wrappers.
#[derive(Default)]
pub struct WrapperCache {
    entries: DashMap<usize, CacheEntry>,
}

impl WrapperCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live wrapper for a callable, if one has a call in flight.
    pub fn lookup(&self, original: &Value) -> Option<Arc<TimedFunction>> {
        let key = identity(original)?;
        self.entries
            .get(&key)
            .map(|entry| Arc::clone(&entry.wrapper))
    }

    /// Register the start of a call through `wrapper`.
    ///
    /// The first wrapper registered for a callable stays the live one until
    /// every call on it has completed.
    pub fn enter(&self, original: &Value, wrapper: &Arc<TimedFunction>) {
        let Some(key) = identity(original) else {
            return;
        };
        let mut entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            wrapper: Arc::clone(wrapper),
            in_flight: 0,
        });
        entry.in_flight += 1;
    }

    /// Register the completion of a call, releasing the entry when no call
    /// on the callable remains outstanding.
    pub fn leave(&self, original: &Value) {
        let Some(key) = identity(original) else {
            return;
        };
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
        self.entries.remove_if(&key, |_, entry| entry.in_flight == 0);
    }

    /// Number of calls in flight on a callable.
    pub fn in_flight(&self, original: &Value) -> usize {
        identity(original)
            .and_then(|key| self.entries.get(&key).map(|entry| entry.in_flight))
            .unwrap_or(0)
    }

    /// Total number of calls in flight across all callables.
    pub fn total_in_flight(&self) -> usize {
        self.entries.iter().map(|entry| entry.in_flight).sum()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for WrapperCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperCache")
            .field("entries", &self.len())
            .finish()
    }
}
