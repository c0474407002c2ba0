//! Rule definitions read from the host environment.
//!
//! Triggers, tags, and conditions are read-only snapshots taken from the
//! host at matching time; the rule set may change between evaluations, so
//! nothing here is cached across events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Operator;
use crate::variable::VariableRef;

/// One comparison between a resolved variable and an expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// The variable whose resolved value is compared.
    pub actual: VariableRef,
    /// The comparison operator.
    pub comparison: Operator,
    /// The expected value.
    #[serde(default)]
    pub expected: Value,
}

/// A named rule: matches when every condition evaluates true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Host-assigned identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Host trigger type label (informational).
    #[serde(default, rename = "type")]
    pub trigger_type: String,
    /// Conjunctive condition list. Empty means the trigger never matches.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A downstream action associated with one or more triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Trigger ids whose match fires this tag.
    #[serde(default)]
    pub firing_trigger_ids: Vec<String>,
}

impl Tag {
    /// True if this tag is fired by the given trigger.
    #[must_use]
    pub fn references(&self, trigger_id: &str) -> bool {
        self.firing_trigger_ids.iter().any(|id| id == trigger_id)
    }
}

/// One condition of a matched trigger, with the value it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedCondition {
    /// Value the `actual` variable resolved to.
    pub actual_value: Value,
    /// The operator applied.
    pub comparison: Operator,
    /// The expected value.
    pub expected: Value,
}

/// A trigger that matched an event, with its evaluated conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredTrigger {
    /// The matched trigger definition (snapshot).
    pub trigger: Trigger,
    /// Every condition, all true by construction.
    pub matched_conditions: Vec<MatchedCondition>,
}

/// A tag fired by a matched trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredTag {
    /// Tag name.
    pub name: String,
    /// Name of the trigger that fired it.
    pub trigger_name: String,
    /// Wall-clock string captured once per event: every tag fired by the
    /// same event carries an identical value.
    pub time: String,
}

/// Result of matching one event against the host rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Triggers whose conditions all evaluated true.
    pub triggered_triggers: Vec<TriggeredTrigger>,
    /// Tags referenced by the matched triggers.
    pub fired_tags: Vec<FiredTag>,
    /// False when the host exposed no rule introspection: the lists above
    /// are then empty and this is a degraded-data state, not an error.
    pub debug_mode_active: bool,
    /// Total triggers in the host rule set at matching time.
    pub total_triggers: usize,
    /// Total tags in the host rule set at matching time.
    pub total_tags: usize,
}

impl MatchResult {
    /// The degraded result reported when the host offers no introspection.
    #[must_use]
    pub fn degraded() -> Self {
        Self {
            triggered_triggers: Vec::new(),
            fired_tags: Vec::new(),
            debug_mode_active: false,
            total_triggers: 0,
            total_tags: 0,
        }
    }
}
