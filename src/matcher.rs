//! Trigger matching.
//!
//! A trigger matches an event when every condition evaluates true —
//! conjunctive semantics only, and a trigger with zero conditions never
//! matches. Rule definitions are read fresh from the host introspection for
//! every event. When the host offers no introspection the result is the
//! degraded state, never an error.

use serde_json::Value;
use tracing::debug;

use crate::condition::{self, Operator};
use crate::error::ScopeError;
use crate::host::RuleIntrospection;
use crate::normalize::TIMER_EVENT_NAME;
use crate::rules::{Condition, FiredTag, MatchResult, MatchedCondition, Trigger, TriggeredTrigger};
use crate::variable::{self, EventContext, VariableKind};

/// Matches one event context against the host rule set.
///
/// `fired_time` is captured once by the caller so every tag fired by the
/// same event carries an identical wall-clock string.
#[must_use]
pub fn analyze(
    introspection: Option<&dyn RuleIntrospection>,
    ctx: &EventContext<'_>,
    fired_time: &str,
) -> MatchResult {
    let Some(introspection) = introspection else {
        return MatchResult::degraded();
    };

    let triggers = introspection.triggers();
    let tags = introspection.tags();

    let mut triggered_triggers = Vec::new();
    let mut fired_tags = Vec::new();

    for trigger in &triggers {
        let Some(matched_conditions) = match_trigger(trigger, ctx) else {
            continue;
        };

        let tag_names = introspection.referenced_tags(&trigger.id).unwrap_or_else(|| {
            tags.iter()
                .filter(|tag| tag.references(&trigger.id))
                .map(|tag| tag.name.clone())
                .collect()
        });

        for name in tag_names {
            fired_tags.push(FiredTag {
                name,
                trigger_name: trigger.name.clone(),
                time: fired_time.to_string(),
            });
        }

        triggered_triggers.push(TriggeredTrigger {
            trigger: trigger.clone(),
            matched_conditions,
        });
    }

    MatchResult {
        triggered_triggers,
        fired_tags,
        debug_mode_active: true,
        total_triggers: triggers.len(),
        total_tags: tags.len(),
    }
}

/// Evaluates one trigger. Returns the evaluated condition list on a match,
/// None otherwise. Zero conditions never match.
#[must_use]
pub fn match_trigger(trigger: &Trigger, ctx: &EventContext<'_>) -> Option<Vec<MatchedCondition>> {
    if trigger.conditions.is_empty() {
        return None;
    }

    let mut matched = Vec::with_capacity(trigger.conditions.len());
    for condition in &trigger.conditions {
        if let Err(err) = validate_condition(condition) {
            debug!(error = %err, trigger = %trigger.name, "condition treated as non-matching");
            return None;
        }

        // Timer gate: when the event is a timer tick, the gating condition is
        // checked by structural shape so resolver fallback cannot mask a real
        // mismatch.
        if ctx.event_name == TIMER_EVENT_NAME && is_timer_gate(condition) {
            matched.push(MatchedCondition {
                actual_value: Value::String(TIMER_EVENT_NAME.to_string()),
                comparison: condition.comparison,
                expected: condition.expected.clone(),
            });
            continue;
        }

        let actual_value = variable::resolve(&condition.actual, ctx);
        if !condition::evaluate(&actual_value, &condition.expected, condition.comparison) {
            return None;
        }
        matched.push(MatchedCondition {
            actual_value,
            comparison: condition.comparison,
            expected: condition.expected.clone(),
        });
    }

    Some(matched)
}

/// Rejects conditions missing required fields. A field lookup needs a field
/// name; everything else carries its values inline.
fn validate_condition(condition: &Condition) -> Result<(), ScopeError> {
    if condition.actual.kind == VariableKind::DataLayerField
        && condition
            .actual
            .name
            .as_deref()
            .map_or(true, |n| n.trim().is_empty())
    {
        return Err(ScopeError::malformed_rule(
            "dataLayerField condition without a field name",
        ));
    }
    Ok(())
}

/// Structural shape of a timer-gate condition: an equality on the `event`
/// field expecting the timer event name.
fn is_timer_gate(condition: &Condition) -> bool {
    condition.comparison == Operator::Equals
        && condition.expected.as_str() == Some(TIMER_EVENT_NAME)
        && condition.actual.kind == VariableKind::DataLayerField
        && condition.actual.name.as_deref() == Some("event")
}
