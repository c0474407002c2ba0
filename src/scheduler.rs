//! Cooperative single-threaded task scheduling.
//!
//! All engine work runs as short, non-blocking tasks ordered by a virtual
//! tick clock. Tasks scheduled with equal delays run in submission order.
//! The queue is pumped explicitly (`pop_due`), which keeps interception,
//! enrichment, and polling deterministic and testable without real timers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Virtual time unit. All intervals and windows in the engine are ticks.
pub type Tick = u64;

#[derive(Debug)]
struct Entry<T> {
    due: Tick,
    seq: u64,
    task: T,
}

// Min-heap ordering: earliest due first, submission order on ties.
impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// A deterministic delay queue over virtual ticks.
#[derive(Debug)]
pub struct Scheduler<T> {
    now: Tick,
    seq: u64,
    queue: BinaryHeap<Entry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Creates an empty scheduler at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: 0,
            seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// The current virtual time.
    #[must_use]
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Schedules a task `delay` ticks from now.
    pub fn schedule_after(&mut self, delay: Tick, task: T) {
        self.schedule_at(self.now.saturating_add(delay), task);
    }

    /// Schedules a task at an absolute tick (clamped to now).
    pub fn schedule_at(&mut self, due: Tick, task: T) {
        let due = due.max(self.now);
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Entry { due, seq, task });
    }

    /// Pops the next task due at or before `until`, advancing the clock to
    /// its due tick. Returns None once nothing is due; the clock is then
    /// advanced to `until`.
    pub fn pop_due(&mut self, until: Tick) -> Option<T> {
        match self.queue.peek() {
            Some(entry) if entry.due <= until => {
                let entry = self.queue.pop()?;
                self.now = self.now.max(entry.due);
                Some(entry.task)
            }
            _ => {
                self.now = self.now.max(until);
                None
            }
        }
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
