//! Dispatch gate and consumer event stream.
//!
//! The gate finalizes an enriched event: it assigns the timestamp (keeping
//! the synthetic one on historical events), performs one last sanitization
//! pass that replaces live host references with a minimal descriptor, and
//! emits through a bounded channel with `try_send`. Emission never blocks
//! the matching pipeline; a slow or gone consumer costs a counter increment,
//! nothing more.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ScopeError, ScopeResult};
use crate::event::Event;

/// Marker key identifying a live host object reference inside a payload.
/// Such nodes cannot be meaningfully serialized and are substituted with a
/// descriptor string at dispatch.
pub const HOST_REF_KEY: &str = "__host_ref";

const MAX_SANITIZE_DEPTH: usize = 64;

/// Replaces unserializable nodes with minimal descriptors.
#[must_use]
pub fn sanitize(value: Value) -> Value {
    sanitize_at(value, 0, &mut 0)
}

fn sanitize_at(value: Value, depth: usize, replaced: &mut usize) -> Value {
    if depth >= MAX_SANITIZE_DEPTH {
        *replaced += 1;
        return Value::String("[unserializable: depth exceeded]".to_string());
    }
    match value {
        Value::Object(map) => {
            if let Some(kind) = map.get(HOST_REF_KEY).and_then(Value::as_str) {
                *replaced += 1;
                return Value::String(format!("[unserializable: {kind}]"));
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, sanitize_at(v, depth + 1, replaced)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| sanitize_at(v, depth + 1, replaced))
                .collect(),
        ),
        other => other,
    }
}

/// Finalizes and emits completed events, exactly once each.
#[derive(Debug)]
pub struct DispatchGate {
    tx: Sender<Event>,
    dropped: Arc<AtomicU64>,
    last_timestamp: DateTime<Utc>,
}

impl DispatchGate {
    /// Creates a gate and its consumer stream over a bounded channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = bounded::<Event>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let gate = Self {
            tx,
            dropped: Arc::clone(&dropped),
            last_timestamp: DateTime::UNIX_EPOCH,
        };
        (gate, EventStream { rx, dropped })
    }

    /// Timestamps, sanitizes, and emits an event. Fire-and-forget: a full or
    /// disconnected stream increments the dropped counter.
    pub fn dispatch(&mut self, mut event: Event) {
        if !event.historical {
            event.timestamp = self.monotonic_now();
        }

        let mut replaced = 0;
        event.raw = sanitize_at(event.raw, 0, &mut replaced);
        event.details =
            match sanitize_at(Value::Object(std::mem::take(&mut event.details)), 0, &mut replaced)
            {
                Value::Object(map) => map,
                // A host-ref marker at the payload root collapses to a descriptor.
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            };
        if let Some(snapshot) = event.collection_snapshot.take() {
            event.collection_snapshot = Some(sanitize_at(snapshot, 0, &mut replaced));
        }
        if replaced > 0 {
            let err = ScopeError::serialization(format!(
                "{replaced} unserializable node(s) substituted"
            ));
            debug!(error = %err, name = %event.name, "payload sanitized before dispatch");
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("event stream full or gone, dropping dispatch");
            }
        }
    }

    /// Strictly increasing wall-clock assignment.
    fn monotonic_now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = if now > self.last_timestamp {
            now
        } else {
            self.last_timestamp + Duration::microseconds(1)
        };
        self.last_timestamp = stamp;
        stamp
    }

    /// Events dropped because the consumer was slow or gone.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer handle receiving dispatched events.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Receives the next event (blocking).
    pub fn recv(&self) -> ScopeResult<Event> {
        self.rx.recv().map_err(|_| ScopeError::Disconnected {
            path: "event_stream".to_string(),
        })
    }

    /// Receives the next event with a timeout.
    pub fn recv_timeout(&self, timeout: StdDuration) -> ScopeResult<Event> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ScopeError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => ScopeError::Disconnected {
                path: "event_stream".to_string(),
            },
        })
    }

    /// Receives without blocking. None when nothing is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Drains everything currently queued.
    #[must_use]
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(event) = self.try_recv() {
            out.push(event);
        }
        out
    }

    /// Events dropped on the gate side because this stream was slow.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
