//! Typed variable references and their resolution.
//!
//! A [`VariableRef`] is a closed tagged variant; resolution dispatches one
//! function per kind. Data-layer fields are looked up first in a flattened
//! view of the event's own payload, then in the collection backlog
//! newest-first, then fall back to the declared default. Failures never
//! propagate: the resolved value becomes an error-descriptor string and
//! matching continues.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ScopeError, ScopeResult};

/// The closed set of variable kinds this engine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableKind {
    /// A named field looked up in the event payload and backlog.
    DataLayerField,
    /// The current page address.
    PageUrl,
    /// A static constant, carried in the default value.
    Constant,
    /// A host-computed value, snapshotted into the default at definition
    /// time and never recomputed per lookup.
    CustomFunction,
    /// Any kind this engine does not model. Resolves to the default value.
    #[serde(other)]
    Unknown,
}

/// A typed variable reference as it appears in trigger conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
    /// Which resolver arm applies.
    #[serde(rename = "type")]
    pub kind: VariableKind,
    /// Field name parameter (data-layer fields only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fallback value when the lookup finds nothing.
    #[serde(default)]
    pub default_value: Value,
}

impl VariableRef {
    /// A data-layer field lookup.
    #[must_use]
    pub fn data_layer_field(name: impl Into<String>) -> Self {
        Self {
            kind: VariableKind::DataLayerField,
            name: Some(name.into()),
            default_value: Value::Null,
        }
    }

    /// The current page address.
    #[must_use]
    pub fn page_url() -> Self {
        Self {
            kind: VariableKind::PageUrl,
            name: None,
            default_value: Value::Null,
        }
    }

    /// A static constant.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self {
            kind: VariableKind::Constant,
            name: None,
            default_value: value,
        }
    }

    /// Sets the fallback value.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }
}

/// The evaluation context for one event: the flattened payload view, the
/// collection backlog, and the page address.
#[derive(Debug)]
pub struct EventContext<'a> {
    /// Canonical event name.
    pub event_name: &'a str,
    /// Flattened payload: top-level keys, nested `parameters` keys (nested
    /// wins), and `timer.`-prefixed keys of an embedded timer object.
    pub flattened: Map<String, Value>,
    /// Collection entries, oldest first. Searched newest-first.
    pub backlog: &'a [Value],
    /// Current page address.
    pub page_url: &'a str,
}

impl<'a> EventContext<'a> {
    /// Builds a context from a normalized payload.
    #[must_use]
    pub fn new(
        event_name: &'a str,
        details: &Map<String, Value>,
        backlog: &'a [Value],
        page_url: &'a str,
    ) -> Self {
        Self {
            event_name,
            flattened: flatten_details(details),
            backlog,
            page_url,
        }
    }
}

/// Flattens a payload for field lookup: nested parameter keys override
/// top-level keys of the same name, and an embedded `timer` object is also
/// exposed under dotted names such as `timer.time`.
#[must_use]
pub fn flatten_details(details: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = details.clone();

    if let Some(Value::Object(params)) = details.get("parameters") {
        for (k, v) in params {
            flat.insert(k.clone(), v.clone());
        }
    }

    if let Some(Value::Object(timer)) = flat.get("timer").cloned() {
        for (k, v) in timer {
            flat.insert(format!("timer.{k}"), v);
        }
    }

    flat
}

/// Resolves a variable reference against the event context. Never fails:
/// resolution errors become descriptor strings.
#[must_use]
pub fn resolve(var: &VariableRef, ctx: &EventContext<'_>) -> Value {
    match try_resolve(var, ctx) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "variable resolution recovered with descriptor");
            Value::String(format!("[resolution error: {err}]"))
        }
    }
}

fn try_resolve(var: &VariableRef, ctx: &EventContext<'_>) -> ScopeResult<Value> {
    match var.kind {
        VariableKind::DataLayerField => {
            let name = var
                .name
                .as_deref()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| {
                    ScopeError::resolution("dataLayerField", "missing field name parameter")
                })?;
            Ok(resolve_data_layer_field(name, var, ctx))
        }
        VariableKind::PageUrl => Ok(Value::String(ctx.page_url.to_string())),
        VariableKind::Constant | VariableKind::CustomFunction | VariableKind::Unknown => {
            Ok(var.default_value.clone())
        }
    }
}

fn resolve_data_layer_field(name: &str, var: &VariableRef, ctx: &EventContext<'_>) -> Value {
    if let Some(value) = ctx.flattened.get(name) {
        return value.clone();
    }

    // Backlog search, reverse chronological.
    for entry in ctx.backlog.iter().rev() {
        if let Value::Object(map) = entry {
            if let Some(value) = map.get(name) {
                return value.clone();
            }
        }
    }

    var.default_value.clone()
}
