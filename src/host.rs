//! Host environment collaborators.
//!
//! The page environment supplies named append-only collections, an optional
//! rule-introspection surface, and an optional debug-mode capability. The
//! engine depends only on these traits; `StaticHost` is the in-process
//! implementation used by embedders and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::collection::{CollectionAdapter, InMemoryCollection};
use crate::rules::{Tag, Trigger};
use crate::variable::VariableRef;

/// Optional rule-introspection surface exposed by the host.
///
/// Definitions are fresh snapshots per call; the rule set may change between
/// evaluations, so callers must not cache across events.
pub trait RuleIntrospection: Send + Sync {
    /// The trigger definitions.
    fn triggers(&self) -> Vec<Trigger>;

    /// The tag definitions.
    fn tags(&self) -> Vec<Tag>;

    /// The standalone variable definitions. Conditions embed their own
    /// variable references, so hosts without this surface return nothing.
    fn variables(&self) -> Vec<VariableRef> {
        Vec::new()
    }

    /// The host's native reverse lookup per trigger. None when the accessor
    /// is unavailable; callers then fall back to scanning each tag's
    /// firing-trigger-id list.
    fn referenced_tags(&self, trigger_id: &str) -> Option<Vec<String>>;
}

/// The page environment the engine observes.
pub trait HostEnvironment: Send + Sync {
    /// The current page address.
    fn page_url(&self) -> String;

    /// The collection with the given name, created empty when missing.
    fn collection(&self, name: &str) -> Arc<dyn CollectionAdapter>;

    /// The rule-introspection surface, when the host offers one.
    fn introspection(&self) -> Option<Arc<dyn RuleIntrospection>>;

    /// Best-effort debug-mode activation. True when the host accepted.
    fn enable_debug_mode(&self) -> bool;
}

/// A fixed rule set with an optional native reverse lookup.
#[derive(Debug, Default)]
pub struct StaticIntrospection {
    triggers: Vec<Trigger>,
    tags: Vec<Tag>,
    variables: Vec<VariableRef>,
    native_lookup: Option<HashMap<String, Vec<String>>>,
}

impl StaticIntrospection {
    /// Creates an introspection surface over the given rule set. The
    /// fallback tag scan applies; no native reverse lookup is offered.
    #[must_use]
    pub fn new(triggers: Vec<Trigger>, tags: Vec<Tag>) -> Self {
        Self {
            triggers,
            tags,
            variables: Vec::new(),
            native_lookup: None,
        }
    }

    /// Adds standalone variable definitions.
    #[must_use]
    pub fn with_variables(mut self, variables: Vec<VariableRef>) -> Self {
        self.variables = variables;
        self
    }

    /// Adds a native trigger-id → tag-names reverse lookup.
    #[must_use]
    pub fn with_native_lookup(mut self, lookup: HashMap<String, Vec<String>>) -> Self {
        self.native_lookup = Some(lookup);
        self
    }
}

impl RuleIntrospection for StaticIntrospection {
    fn triggers(&self) -> Vec<Trigger> {
        self.triggers.clone()
    }

    fn tags(&self) -> Vec<Tag> {
        self.tags.clone()
    }

    fn variables(&self) -> Vec<VariableRef> {
        self.variables.clone()
    }

    fn referenced_tags(&self, trigger_id: &str) -> Option<Vec<String>> {
        self.native_lookup
            .as_ref()
            .map(|lookup| lookup.get(trigger_id).cloned().unwrap_or_default())
    }
}

/// In-process host environment backed by `InMemoryCollection`s.
pub struct StaticHost {
    page_url: String,
    collections: Mutex<HashMap<String, Arc<InMemoryCollection>>>,
    introspection: RwLock<Option<Arc<dyn RuleIntrospection>>>,
    debug_mode_available: AtomicBool,
}

impl StaticHost {
    /// Creates a host with no collections, no introspection, and no debug
    /// capability.
    #[must_use]
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            collections: Mutex::new(HashMap::new()),
            introspection: RwLock::new(None),
            debug_mode_available: AtomicBool::new(false),
        }
    }

    /// Installs or swaps the rule-introspection surface. Passing None
    /// removes it (degraded-data state for subsequent events).
    pub fn set_introspection(&self, introspection: Option<Arc<dyn RuleIntrospection>>) {
        *self
            .introspection
            .write()
            .expect("introspection lock poisoned") = introspection;
    }

    /// Controls whether `enable_debug_mode` succeeds.
    pub fn set_debug_mode_available(&self, available: bool) {
        self.debug_mode_available.store(available, Ordering::Relaxed);
    }

    /// Direct handle to a named collection, for host-side mutation.
    pub fn collection_named(&self, name: &str) -> Arc<InMemoryCollection> {
        let mut collections = self.collections.lock().expect("collections lock poisoned");
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemoryCollection::new(name))),
        )
    }

    /// Pre-populates a named collection with a backlog.
    pub fn seed_collection(&self, name: &str, entries: Vec<serde_json::Value>) {
        let mut collections = self.collections.lock().expect("collections lock poisoned");
        collections.insert(
            name.to_string(),
            Arc::new(InMemoryCollection::with_entries(name, entries)),
        );
    }
}

impl HostEnvironment for StaticHost {
    fn page_url(&self) -> String {
        self.page_url.clone()
    }

    fn collection(&self, name: &str) -> Arc<dyn CollectionAdapter> {
        self.collection_named(name)
    }

    fn introspection(&self) -> Option<Arc<dyn RuleIntrospection>> {
        self.introspection
            .read()
            .expect("introspection lock poisoned")
            .clone()
    }

    fn enable_debug_mode(&self) -> bool {
        self.debug_mode_available.load(Ordering::Relaxed)
    }
}
