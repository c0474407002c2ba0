//! Event normalization.
//!
//! Raw appended entries arrive as arrays, objects, or scalars. The
//! normalizer converts each into a partially-populated [`Event`] with an
//! object-form payload and a canonical name resolved through a fallback
//! chain. A parallel scan variant recognizes only entries that belong to the
//! monitored rule system and drops everything else silently.

use serde_json::{Map, Value};

use crate::event::{Event, EventSource};

/// Primary event-name key.
pub const EVENT_KEY: &str = "event";
/// Alternate event-name key.
pub const EVENT_NAME_KEY: &str = "eventName";
/// Generic custom-event wrapper name. When an entry carries this name the
/// alias field below holds the real event name.
pub const CUSTOM_EVENT_NAME: &str = "mtm.CustomEvent";
/// Alias key naming the wrapped custom event.
pub const CUSTOM_EVENT_ALIAS_KEY: &str = "mtm.customEventName";
/// Event name produced by host timer ticks.
pub const TIMER_EVENT_NAME: &str = "mtm.Timer";
/// Prefix identifying rule-system event names.
pub const RULE_EVENT_PREFIX: &str = "mtm.";
/// Fallback label for entries with no recognizable name.
pub const GENERIC_EVENT_NAME: &str = "Custom Event";

/// Key of the legacy two-field entry form (paired with `parameters`).
pub const LEGACY_TIMESTAMP_KEY: &str = "timestamp";
/// Key of the legacy two-field entry form (paired with `timestamp`).
pub const LEGACY_PARAMETERS_KEY: &str = "parameters";

/// Normalizes an appended entry observed through the interception path.
#[must_use]
pub fn normalize_push(raw: &Value, array_index: Option<usize>, historical: bool) -> Event {
    let (name, details) = normalize_parts(raw);
    Event::new(
        EventSource::CollectionPush,
        historical,
        array_index,
        name,
        details,
        raw.clone(),
    )
}

/// Normalizes an entry found during a collection scan. Entries that do not
/// match the monitored rule system's event-name patterns are dropped.
#[must_use]
pub fn normalize_scan(raw: &Value, array_index: Option<usize>, historical: bool) -> Option<Event> {
    if !is_rule_system_entry(raw) {
        return None;
    }
    let (name, details) = normalize_parts(raw);
    Some(Event::new(
        EventSource::CollectionScan,
        historical,
        array_index,
        name,
        details,
        raw.clone(),
    ))
}

/// Recognition used by the scan variant: explicit prefix match, alias
/// fields, or the legacy timestamp/parameter pair.
#[must_use]
pub fn is_rule_system_entry(raw: &Value) -> bool {
    let Value::Object(map) = raw else {
        return false;
    };

    if let Some(name) = string_field(map, EVENT_KEY).or_else(|| string_field(map, EVENT_NAME_KEY))
    {
        if name.starts_with(RULE_EVENT_PREFIX) {
            return true;
        }
    }

    if map.contains_key(CUSTOM_EVENT_ALIAS_KEY) {
        return true;
    }

    map.contains_key(LEGACY_TIMESTAMP_KEY) && map.contains_key(LEGACY_PARAMETERS_KEY)
}

fn normalize_parts(raw: &Value) -> (String, Map<String, Value>) {
    match raw {
        Value::Array(items) => {
            let action = items.first().cloned().unwrap_or(Value::Null);
            let parameters: Vec<Value> = items.iter().skip(1).cloned().collect();
            let name = action
                .as_str()
                .map_or_else(|| GENERIC_EVENT_NAME.to_string(), str::to_string);

            let mut details = Map::new();
            details.insert("action".to_string(), action);
            details.insert("parameters".to_string(), Value::Array(parameters));
            (name, details)
        }
        Value::Object(map) => (resolve_name(map), map.clone()),
        scalar => {
            let mut details = Map::new();
            details.insert("value".to_string(), scalar.clone());
            (GENERIC_EVENT_NAME.to_string(), details)
        }
    }
}

/// Name fallback chain: explicit name field, then the custom-event alias
/// when the explicit name is the generic wrapper, then the fallback label.
fn resolve_name(map: &Map<String, Value>) -> String {
    let explicit = string_field(map, EVENT_KEY).or_else(|| string_field(map, EVENT_NAME_KEY));

    match explicit {
        Some(name) if name == CUSTOM_EVENT_NAME => string_field(map, CUSTOM_EVENT_ALIAS_KEY)
            .unwrap_or(name)
            .to_string(),
        Some(name) => name.to_string(),
        None => string_field(map, CUSTOM_EVENT_ALIAS_KEY)
            .unwrap_or(GENERIC_EVENT_NAME)
            .to_string(),
    }
}

fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}
