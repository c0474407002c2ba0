//! The tagscope engine.
//!
//! One engine context is constructed per monitored page session; it owns the
//! scheduler, the interception watches, the global dedup cache, and the
//! dispatch gate. There is no module-level state: tear the engine down and
//! nothing leaks into the next session.
//!
//! Execution is single-threaded cooperative. The embedder pumps the engine
//! with [`ScopeEngine::run_until`]; native appends go through
//! [`ScopeEngine::push`] and run synchronously inside the caller's append.

/// Dispatch gate and consumer stream.
pub mod gate;
/// Per-collection interception state.
pub mod interceptor;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dedup::DedupCache;
use crate::event::Event;
use crate::host::HostEnvironment;
use crate::matcher;
use crate::scheduler::{Scheduler, Tick};
use crate::sink::EventLog;
use crate::variable::EventContext;

pub use gate::{DispatchGate, EventStream, HOST_REF_KEY};
pub use interceptor::Watch;

/// Which monitored collection an event came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionSlot {
    /// The rule system's own collection.
    Primary,
    /// The compatibility collection.
    Secondary,
}

/// Engine configuration. All intervals and windows are in ticks.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Observe the primary collection.
    pub watch_primary_collection: bool,
    /// Observe the secondary collection.
    pub watch_secondary_collection: bool,
    /// Host-side name of the primary collection.
    pub primary_collection: String,
    /// Host-side name of the secondary collection.
    pub secondary_collection: String,
    /// Backlog-length polling interval.
    pub poll_interval: Tick,
    /// Re-interception check interval.
    pub reintercept_interval: Tick,
    /// Cache cleanup interval.
    pub sweep_interval: Tick,
    /// Delay between observation and enrichment/dispatch.
    pub enrich_delay: Tick,
    /// Global dedup cache window.
    pub global_window: Tick,
    /// Presentation dedup cache window (used by [`ScopeEngine::event_log`]).
    pub presentation_window: Tick,
    /// Debug-mode activation attempts before reporting a timeout.
    pub debug_probe_attempts: u32,
    /// Interval between debug-mode activation attempts.
    pub debug_probe_interval: Tick,
    /// Consumer stream buffer capacity.
    pub stream_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_primary_collection: true,
            watch_secondary_collection: true,
            primary_collection: "_mtm".to_string(),
            secondary_collection: "dataLayer".to_string(),
            poll_interval: 200,
            reintercept_interval: 1000,
            sweep_interval: 5000,
            enrich_delay: 50,
            global_window: 1000,
            presentation_window: 2000,
            debug_probe_attempts: 20,
            debug_probe_interval: 500,
            stream_capacity: 1024,
        }
    }
}

/// Outcome of the startup debug-mode probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugProbeOutcome {
    /// Still retrying.
    Pending,
    /// The host accepted debug-mode activation.
    Enabled,
    /// All attempts exhausted without the host accepting.
    TimedOut,
}

#[derive(Debug)]
enum EngineTask {
    Enrich { event: Event, slot: CollectionSlot, generation: u64 },
    Poll { slot: CollectionSlot },
    Reintercept { slot: CollectionSlot },
    SweepCaches,
    DebugModeProbe { attempt: u32 },
}

/// The per-session engine context.
pub struct ScopeEngine {
    config: EngineConfig,
    host: Arc<dyn HostEnvironment>,
    scheduler: Scheduler<EngineTask>,
    watches: Vec<Watch>,
    dedup: DedupCache,
    gate: DispatchGate,
    generation: Arc<AtomicU64>,
    duplicates_suppressed: u64,
    debug_probe: DebugProbeOutcome,
}

impl ScopeEngine {
    /// Builds an engine over the host environment and returns it with the
    /// consumer stream. Backlog entries in watched collections are scanned
    /// immediately and their enrichment scheduled; pump with `run_until` to
    /// see them dispatched.
    #[must_use]
    pub fn new(config: EngineConfig, host: Arc<dyn HostEnvironment>) -> (Self, EventStream) {
        let (gate, stream) = DispatchGate::channel(config.stream_capacity);
        let mut engine = Self {
            dedup: DedupCache::new(config.global_window),
            scheduler: Scheduler::new(),
            watches: Vec::new(),
            gate,
            generation: Arc::new(AtomicU64::new(0)),
            duplicates_suppressed: 0,
            debug_probe: DebugProbeOutcome::Pending,
            host,
            config,
        };

        if engine.config.watch_primary_collection {
            engine.install_watch(CollectionSlot::Primary);
        }
        if engine.config.watch_secondary_collection {
            engine.install_watch(CollectionSlot::Secondary);
        }

        engine
            .scheduler
            .schedule_after(engine.config.sweep_interval, EngineTask::SweepCaches);
        engine
            .scheduler
            .schedule_after(0, EngineTask::DebugModeProbe { attempt: 1 });

        (engine, stream)
    }

    fn install_watch(&mut self, slot: CollectionSlot) {
        let name = match slot {
            CollectionSlot::Primary => &self.config.primary_collection,
            CollectionSlot::Secondary => &self.config.secondary_collection,
        };
        let adapter = self.host.collection(name);
        let mut watch = Watch::install(slot, adapter);

        let backlog = watch.scan_backlog();
        self.watches.push(watch);
        for event in backlog {
            self.admit(slot, event);
        }

        self.scheduler
            .schedule_after(self.config.poll_interval, EngineTask::Poll { slot });
        self.scheduler
            .schedule_after(self.config.reintercept_interval, EngineTask::Reintercept { slot });
    }

    /// The wrapped append: the entry lands in the collection first (native
    /// semantics and return value preserved), then the observation pipeline
    /// runs. Internal failures never reach the caller.
    pub fn push(&mut self, slot: CollectionSlot, entry: Value) -> usize {
        let adapter = match self.watch_index(slot) {
            Some(i) => Arc::clone(&self.watches[i].adapter),
            None => {
                // Slot not watched: append without observing.
                let name = match slot {
                    CollectionSlot::Primary => &self.config.primary_collection,
                    CollectionSlot::Secondary => &self.config.secondary_collection,
                };
                return self.host.collection(name).append(entry);
            }
        };

        let index = adapter.append(entry.clone());

        if let Some(i) = self.watch_index(slot) {
            if let Some(event) = self.watches[i].observe_push(&entry, index) {
                self.admit(slot, event);
            }
        }

        index
    }

    /// Advances virtual time, running every due task in delay-expiry order.
    pub fn run_until(&mut self, tick: Tick) {
        while let Some(task) = self.scheduler.pop_due(tick) {
            self.handle(task);
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    /// A presentation-side event log sharing this engine's generation
    /// counter: clearing the log invalidates in-flight enrichment.
    #[must_use]
    pub fn event_log(&self) -> EventLog {
        EventLog::new(self.config.presentation_window, Arc::clone(&self.generation))
    }

    /// Duplicates suppressed by the global cache.
    #[must_use]
    pub fn duplicates_suppressed(&self) -> u64 {
        self.duplicates_suppressed
    }

    /// Events dropped at the gate because the consumer was slow or gone.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.gate.dropped_events()
    }

    /// Outcome of the startup debug-mode probe.
    #[must_use]
    pub fn debug_probe_outcome(&self) -> DebugProbeOutcome {
        self.debug_probe
    }

    fn watch_index(&self, slot: CollectionSlot) -> Option<usize> {
        self.watches.iter().position(|w| w.slot == slot)
    }

    /// Dedup-checks an observed event and schedules its enrichment.
    fn admit(&mut self, slot: CollectionSlot, event: Event) {
        let signature = event.signature();
        if self.dedup.check_and_insert(&signature, self.scheduler.now()) {
            self.duplicates_suppressed += 1;
            debug!(name = %event.name, "duplicate suppressed by global cache");
            return;
        }

        let generation = self.generation.load(Ordering::Relaxed);
        self.scheduler.schedule_after(
            self.config.enrich_delay,
            EngineTask::Enrich { event, slot, generation },
        );
    }

    fn handle(&mut self, task: EngineTask) {
        match task {
            EngineTask::Enrich { event, slot, generation } => {
                self.handle_enrich(event, slot, generation);
            }
            EngineTask::Poll { slot } => {
                self.handle_poll(slot);
                self.scheduler
                    .schedule_after(self.config.poll_interval, EngineTask::Poll { slot });
            }
            EngineTask::Reintercept { slot } => {
                if let Some(i) = self.watch_index(slot) {
                    self.watches[i].reintercept();
                }
                self.scheduler.schedule_after(
                    self.config.reintercept_interval,
                    EngineTask::Reintercept { slot },
                );
            }
            EngineTask::SweepCaches => {
                self.dedup.sweep(self.scheduler.now());
                self.scheduler
                    .schedule_after(self.config.sweep_interval, EngineTask::SweepCaches);
            }
            EngineTask::DebugModeProbe { attempt } => self.handle_debug_probe(attempt),
        }
    }

    fn handle_poll(&mut self, slot: CollectionSlot) {
        let Some(i) = self.watch_index(slot) else {
            return;
        };
        let events = self.watches[i].poll();
        for event in events {
            self.admit(slot, event);
        }
    }

    fn handle_enrich(&mut self, mut event: Event, slot: CollectionSlot, generation: u64) {
        if generation != self.generation.load(Ordering::Relaxed) {
            debug!(name = %event.name, "stale enrichment dropped after consumer clear");
            return;
        }

        let backlog: Vec<Value> = self
            .watch_index(slot)
            .map(|i| self.watches[i].adapter.snapshot())
            .unwrap_or_default();

        let page_url = self.host.page_url();
        let analysis = {
            let ctx = EventContext::new(&event.name, &event.details, &backlog, &page_url);
            // One wall-clock string per event; every tag fired by this event
            // carries the same value.
            let fired_time = Utc::now().format("%H:%M:%S").to_string();
            let introspection = self.host.introspection();
            matcher::analyze(introspection.as_deref(), &ctx, &fired_time)
        };

        event.trigger_analysis = Some(analysis);
        event.collection_snapshot = Some(Value::Array(backlog));

        self.gate.dispatch(event);
    }

    fn handle_debug_probe(&mut self, attempt: u32) {
        if self.host.enable_debug_mode() {
            self.debug_probe = DebugProbeOutcome::Enabled;
            info!(attempt, "host debug mode enabled");
        } else if attempt >= self.config.debug_probe_attempts {
            self.debug_probe = DebugProbeOutcome::TimedOut;
            warn!(
                attempts = attempt,
                "host never offered debug mode, continuing degraded"
            );
        } else {
            self.scheduler.schedule_after(
                self.config.debug_probe_interval,
                EngineTask::DebugModeProbe { attempt: attempt + 1 },
            );
        }
    }
}
