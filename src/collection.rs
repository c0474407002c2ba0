//! Collection adapters.
//!
//! The engine never patches a foreign object's method table; it depends only
//! on this adapter interface, implemented per host-collection type. The
//! observed marker and per-entry processed flags live in the adapter and are
//! lost when the host replaces the collection, which is exactly what the
//! periodic re-interception check detects.

use std::sync::Mutex;

use serde_json::Value;

/// Append-only collection surface the engine observes.
pub trait CollectionAdapter: Send + Sync {
    /// The collection's host-side name.
    fn name(&self) -> &str;

    /// Current number of entries.
    fn current_length(&self) -> usize;

    /// Reads the entry at `index`, if present.
    fn read_at(&self, index: usize) -> Option<Value>;

    /// Appends an entry, preserving native append semantics. Returns the new
    /// entry's index (the native return value).
    fn append(&self, entry: Value) -> usize;

    /// True when the entry at `index` was already reported.
    fn is_processed(&self, index: usize) -> bool;

    /// Marks the entry at `index` as reported.
    fn mark_processed(&self, index: usize);

    /// True while the engine's observer marker is installed.
    fn is_observed(&self) -> bool;

    /// Installs the observer marker.
    fn mark_observed(&self);

    /// Best-effort snapshot of all entries for audit display.
    fn snapshot(&self) -> Vec<Value> {
        (0..self.current_length())
            .filter_map(|i| self.read_at(i))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<(Value, bool)>,
    observed: bool,
}

/// An in-process collection backing the adapter interface. Used by embedders
/// and tests; hosts with a real data layer implement the trait themselves.
#[derive(Debug)]
pub struct InMemoryCollection {
    name: String,
    inner: Mutex<Inner>,
}

impl InMemoryCollection {
    /// Creates an empty collection with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Creates a collection pre-populated with a backlog.
    #[must_use]
    pub fn with_entries(name: impl Into<String>, entries: Vec<Value>) -> Self {
        let collection = Self::new(name);
        {
            let mut inner = collection.inner.lock().expect("collection lock poisoned");
            inner.entries = entries.into_iter().map(|e| (e, false)).collect();
        }
        collection
    }

    /// Simulates the host replacing the collection wholesale: new contents,
    /// observer marker and processed flags gone.
    pub fn replace_with(&self, entries: Vec<Value>) {
        let mut inner = self.inner.lock().expect("collection lock poisoned");
        inner.entries = entries.into_iter().map(|e| (e, false)).collect();
        inner.observed = false;
    }

    /// Appends without going through the engine, as direct external
    /// mutation would. Picked up by the polling path.
    pub fn push_direct(&self, entry: Value) -> usize {
        self.append(entry)
    }
}

impl CollectionAdapter for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_length(&self) -> usize {
        self.inner.lock().expect("collection lock poisoned").entries.len()
    }

    fn read_at(&self, index: usize) -> Option<Value> {
        self.inner
            .lock()
            .expect("collection lock poisoned")
            .entries
            .get(index)
            .map(|(entry, _)| entry.clone())
    }

    fn append(&self, entry: Value) -> usize {
        let mut inner = self.inner.lock().expect("collection lock poisoned");
        inner.entries.push((entry, false));
        inner.entries.len() - 1
    }

    fn is_processed(&self, index: usize) -> bool {
        self.inner
            .lock()
            .expect("collection lock poisoned")
            .entries
            .get(index)
            .is_some_and(|(_, processed)| *processed)
    }

    fn mark_processed(&self, index: usize) {
        let mut inner = self.inner.lock().expect("collection lock poisoned");
        if let Some((_, processed)) = inner.entries.get_mut(index) {
            *processed = true;
        }
    }

    fn is_observed(&self) -> bool {
        self.inner.lock().expect("collection lock poisoned").observed
    }

    fn mark_observed(&self) {
        self.inner.lock().expect("collection lock poisoned").observed = true;
    }
}
