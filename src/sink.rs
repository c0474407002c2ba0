//! Consumer-side event log.
//!
//! Delivery order is not authoritative: enrichment for an earlier event can
//! finish after a later one. The log re-sorts by timestamp on insert and
//! applies the presentation dedup cache (same signature, opposite
//! index-presence inside the window means the same logical event seen by
//! both the backlog scan and live interception).
//!
//! Clearing the log bumps the generation shared with the engine, so
//! enrichment still in flight for the cleared view is dropped at the gate
//! instead of reappearing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::dedup::PresentationCache;
use crate::event::Event;
use crate::scheduler::Tick;

/// Presentation-layer storage for dispatched events.
pub struct EventLog {
    events: Vec<Event>,
    cache: PresentationCache,
    generation: Arc<AtomicU64>,
}

impl EventLog {
    /// Creates a log with the given presentation dedup window. The
    /// generation counter is shared with the engine that dispatches into it;
    /// [`crate::engine::ScopeEngine::event_log`] wires this up.
    #[must_use]
    pub fn new(window: Tick, generation: Arc<AtomicU64>) -> Self {
        Self {
            events: Vec::new(),
            cache: PresentationCache::new(window),
            generation,
        }
    }

    /// Offers a dispatched event at the given tick. Returns false when the
    /// presentation cache identified it as the second half of an
    /// indexed/unindexed duplicate pair.
    pub fn offer(&mut self, event: Event, now: Tick) -> bool {
        let signature = event.signature();
        if self
            .cache
            .check_and_insert(&signature, event.array_index.is_some(), now)
        {
            return false;
        }

        // Keep storage ordered by the authoritative timestamp, not by
        // delivery order.
        let position = self
            .events
            .partition_point(|existing| existing.timestamp <= event.timestamp);
        self.events.insert(position, event);
        true
    }

    /// The retained events, ordered by timestamp.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clears the log and invalidates in-flight enrichment by bumping the
    /// shared generation.
    pub fn clear(&mut self) {
        self.events.clear();
        self.cache.clear();
        self.generation.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    use crate::event::EventSource;

    fn event_named(name: &str, array_index: Option<usize>) -> Event {
        let details = match json!({"event": name}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut event = Event::new(
            EventSource::CollectionPush,
            false,
            array_index,
            name,
            details,
            json!({"event": name}),
        );
        event.timestamp = Utc::now();
        event
    }

    #[test]
    fn events_resort_by_timestamp() {
        let mut log = EventLog::new(2000, Arc::new(AtomicU64::new(0)));

        let mut late = event_named("late", None);
        late.timestamp = Utc::now();
        let mut early = event_named("early", None);
        early.timestamp = late.timestamp - Duration::seconds(5);

        // Delivered out of order.
        assert!(log.offer(late, 0));
        assert!(log.offer(early, 10));

        let names: Vec<&str> = log.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn indexed_unindexed_pair_keeps_one() {
        let mut log = EventLog::new(2000, Arc::new(AtomicU64::new(0)));

        assert!(log.offer(event_named("click", Some(2)), 0));
        assert!(!log.offer(event_named("click", None), 100));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn same_presence_repeat_is_kept() {
        let mut log = EventLog::new(2000, Arc::new(AtomicU64::new(0)));

        assert!(log.offer(event_named("click", None), 0));
        assert!(log.offer(event_named("click", None), 100));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn clear_bumps_shared_generation() {
        let generation = Arc::new(AtomicU64::new(0));
        let mut log = EventLog::new(2000, Arc::clone(&generation));

        log.offer(event_named("click", None), 0);
        log.clear();

        assert!(log.is_empty());
        assert_eq!(generation.load(Ordering::Relaxed), 1);
        // The cache forgot the pair too.
        assert!(log.offer(event_named("click", Some(0)), 10));
    }
}
