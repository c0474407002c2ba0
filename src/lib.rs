//! # TagScope - Event Classification for Tag-Manager Data Layers
//!
//! TagScope observes the append-only collections a tag manager writes into,
//! normalizes each entry into an [`Event`], resolves rule variables against
//! the event payload and collection backlog, and evaluates trigger conditions
//! to report which triggers matched and which tags fired.
//!
//! ## Core Concepts
//!
//! - **Event**: A normalized collection entry with a stable dedup signature
//! - **Trigger**: A named conjunction of conditions over resolved variables
//! - **Tag**: A deliverable that fires when one of its triggers matches
//! - **ScopeEngine**: The cooperative scheduler driving interception,
//!   enrichment, and dispatch on a virtual tick clock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tagscope::{EngineConfig, CollectionSlot, ScopeEngine, StaticHost};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let host = Arc::new(StaticHost::new("https://example.com/"));
//! let (mut engine, stream) = ScopeEngine::new(EngineConfig::default(), host);
//!
//! engine.push(CollectionSlot::Primary, json!({"event": "pageview"}));
//! engine.run_until(100);
//!
//! for event in stream.drain() {
//!     println!("{}", event.name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod condition;
pub mod error;
pub mod event;
pub mod rules;
pub mod variable;

// Pipeline stages
pub mod dedup;
pub mod matcher;
pub mod normalize;
pub mod scheduler;

// Host integration and the engine itself
pub mod collection;
pub mod engine;
pub mod host;
pub mod sink;

// Re-export primary types at crate root for convenience
pub use collection::{CollectionAdapter, InMemoryCollection};
pub use condition::Operator;
pub use engine::{
    CollectionSlot, DebugProbeOutcome, DispatchGate, EngineConfig, EventStream, ScopeEngine,
};
pub use error::{ScopeError, ScopeResult};
pub use event::{Event, EventSource, FIRED_TAGS_KEY};
pub use host::{HostEnvironment, RuleIntrospection, StaticHost, StaticIntrospection};
pub use matcher::{analyze, match_trigger};
pub use rules::{
    Condition, FiredTag, MatchResult, MatchedCondition, Tag, Trigger, TriggeredTrigger,
};
pub use scheduler::{Scheduler, Tick};
pub use sink::EventLog;
pub use variable::{EventContext, VariableKind, VariableRef};
