//! Sliding-window duplicate suppression.
//!
//! Two independent caches keyed by the event signature:
//!
//! - [`DedupCache`]: engine-side, short window. Catches the same physical
//!   push reported by both the native interception path and the polling
//!   fallback.
//! - [`PresentationCache`]: consumer-side, longer window. Catches the same
//!   logical event delivered once with an `array_index` (backlog scan) and
//!   once without (live interception). Repeats with matching index-presence
//!   are legitimate identical events and pass through.
//!
//! Both caches sweep lazily on each insert: entries older than the window
//! are evicted before the lookup.

use std::collections::HashMap;

use crate::scheduler::Tick;

/// Engine-internal duplicate cache over raw signatures.
#[derive(Debug)]
pub struct DedupCache {
    window: Tick,
    seen: HashMap<String, Tick>,
}

impl DedupCache {
    /// Creates a cache with the given sliding window.
    #[must_use]
    pub fn new(window: Tick) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Records `signature` at `now`. Returns true when a live entry with the
    /// same signature already existed inside the window (a duplicate).
    pub fn check_and_insert(&mut self, signature: &str, now: Tick) -> bool {
        self.sweep(now);
        let duplicate = self.seen.contains_key(signature);
        self.seen.insert(signature.to_string(), now);
        duplicate
    }

    /// Evicts entries older than the window.
    pub fn sweep(&mut self, now: Tick) {
        let window = self.window;
        self.seen.retain(|_, at| now.saturating_sub(*at) < window);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when no entries are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    at: Tick,
    has_index: bool,
}

/// Consumer-side duplicate cache keyed by signature and index-presence.
#[derive(Debug)]
pub struct PresentationCache {
    window: Tick,
    seen: HashMap<String, Vec<Delivery>>,
}

impl PresentationCache {
    /// Creates a cache with the given sliding window.
    #[must_use]
    pub fn new(window: Tick) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Records a delivery. Returns true when a delivery with the same
    /// signature but opposite index-presence exists inside the window —
    /// the pair is the same logical event and this one should be dropped.
    pub fn check_and_insert(&mut self, signature: &str, has_index: bool, now: Tick) -> bool {
        self.sweep(now);
        let deliveries = self.seen.entry(signature.to_string()).or_default();
        let duplicate = deliveries.iter().any(|d| d.has_index != has_index);
        deliveries.push(Delivery { at: now, has_index });
        duplicate
    }

    /// Evicts deliveries older than the window.
    pub fn sweep(&mut self, now: Tick) {
        let window = self.window;
        self.seen.retain(|_, deliveries| {
            deliveries.retain(|d| now.saturating_sub(d.at) < window);
            !deliveries.is_empty()
        });
    }

    /// Drops all cached deliveries.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
