//! The canonical event record dispatched to consumers.
//!
//! An `Event` is created by the normalizer, enriched in place (trigger
//! analysis, collection snapshot) and becomes immutable once dispatched.
//! Duplicate suppression compares events by a stable signature computed over
//! the name, a source label shared across interception paths, and the
//! payload with annotation keys removed, so a historical scan and a live
//! push of the same logical entry hash identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::rules::MatchResult;

/// Where an event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    /// Observed through the append interception path.
    CollectionPush,
    /// Recognized during a scan of the collection contents.
    CollectionScan,
    /// Any other origin.
    Other,
}

impl EventSource {
    /// Stable label used in signatures. A scanned entry is the same logical
    /// delivery as a pushed one, so both paths share a label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CollectionPush | Self::CollectionScan => "collection-push",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = match self {
            Self::CollectionPush => "collection-push",
            Self::CollectionScan => "collection-scan",
            Self::Other => "other",
        };
        write!(f, "{shown}")
    }
}

/// Payload keys that are annotations, not event content. Stripped before
/// signature serialization so deliveries from different interception paths
/// compare equal.
pub const SIGNATURE_IGNORED_KEYS: &[&str] = &["mtm.processed", "mtm.debug", "timestamp"];

/// The canonical unit dispatched to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event id.
    pub event_id: Uuid,
    /// Observation origin.
    pub source: EventSource,
    /// True when read during the initial backlog scan rather than live.
    pub historical: bool,
    /// Ordinal position within the origin collection, when indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_index: Option<usize>,
    /// Canonical event name.
    pub name: String,
    /// Normalized payload (object form even for array or scalar origins).
    pub details: Map<String, Value>,
    /// The original, unmodified entry.
    pub raw: Value,
    /// Assigned by the dispatch gate; historical events carry a synthetic
    /// value preceding live entries while preserving origin order.
    pub timestamp: DateTime<Utc>,
    /// Result of trigger matching, populated during enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_analysis: Option<MatchResult>,
    /// Tag identifiers carried directly in the payload, independent of
    /// trigger matching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fired_tags: Vec<String>,
    /// Best-effort copy of the collection contents at dispatch time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_snapshot: Option<Value>,
}

impl Event {
    /// Creates a not-yet-enriched event. The timestamp is a placeholder
    /// until the dispatch gate assigns the real one.
    #[must_use]
    pub fn new(
        source: EventSource,
        historical: bool,
        array_index: Option<usize>,
        name: impl Into<String>,
        details: Map<String, Value>,
        raw: Value,
    ) -> Self {
        let fired_tags = extract_fired_tags(&details);
        Self {
            event_id: Uuid::new_v4(),
            source,
            historical,
            array_index,
            name: name.into(),
            details,
            raw,
            timestamp: DateTime::UNIX_EPOCH,
            trigger_analysis: None,
            fired_tags,
            collection_snapshot: None,
        }
    }

    /// Stable duplicate-comparison signature: blake3 over the canonical JSON
    /// form of `{name, source label, cleaned details}`.
    #[must_use]
    pub fn signature(&self) -> String {
        let cleaned = clean_details(&self.details);
        // serde_json::Map keeps keys sorted, so serialization is canonical.
        let canonical = serde_json::json!({
            "name": self.name,
            "source": self.source.label(),
            "details": Value::Object(cleaned),
        });
        let serialized = canonical.to_string();
        blake3::hash(serialized.as_bytes()).to_hex().to_string()
    }
}

/// Payload key holding directly-fired tag identifiers.
pub const FIRED_TAGS_KEY: &str = "mtm.firedTags";

fn extract_fired_tags(details: &Map<String, Value>) -> Vec<String> {
    let Some(Value::Array(items)) = details.get(FIRED_TAGS_KEY) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Removes annotation keys from a payload before signature serialization.
#[must_use]
pub fn clean_details(details: &Map<String, Value>) -> Map<String, Value> {
    details
        .iter()
        .filter(|(k, _)| !SIGNATURE_IGNORED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
