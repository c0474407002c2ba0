use std::sync::Arc;

use serde_json::{json, Value};

use tagscope::{
    CollectionSlot, Condition, EngineConfig, HostEnvironment, Operator, ScopeEngine, StaticHost,
    StaticIntrospection, Tag, Trigger, VariableRef,
};

fn engine_over(host: &Arc<StaticHost>) -> (ScopeEngine, tagscope::EventStream) {
    let host_dyn: Arc<dyn HostEnvironment> = host.clone();
    ScopeEngine::new(EngineConfig::default(), host_dyn)
}

fn event_equals(field: &str, expected: &str) -> Condition {
    Condition {
        actual: VariableRef::data_layer_field(field),
        comparison: Operator::Equals,
        expected: Value::String(expected.to_string()),
    }
}

#[test]
fn custom_event_wrapper_reports_alias_name() {
    let host = Arc::new(StaticHost::new("https://shop.example/checkout"));
    let (mut engine, stream) = engine_over(&host);

    engine.push(
        CollectionSlot::Primary,
        json!({"event": "mtm.CustomEvent", "mtm.customEventName": "click"}),
    );
    engine.run_until(100);

    let events = stream.drain();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.name, "click");
    assert!(!event.historical);

    // No introspection installed: degraded analysis, not an error.
    let analysis = event.trigger_analysis.as_ref().unwrap();
    assert!(!analysis.debug_mode_active);
    assert!(analysis.triggered_triggers.is_empty());
    assert!(analysis.fired_tags.is_empty());
}

#[test]
fn seeded_backlog_replays_as_historical_events() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    // The backlog scan only recognizes rule-system entries.
    host.seed_collection(
        "_mtm",
        vec![
            json!({"event": "mtm.PageView"}),
            json!({"event": "mtm.Timer"}),
            json!({"event": "mtm.CustomEvent", "mtm.customEventName": "click"}),
        ],
    );

    let (mut engine, stream) = engine_over(&host);
    engine.run_until(100);

    let events = stream.drain();
    assert_eq!(events.len(), 3);
    for (position, event) in events.iter().enumerate() {
        assert!(event.historical);
        assert_eq!(event.array_index, Some(position));
    }
    assert_eq!(events[0].name, "mtm.PageView");
    assert_eq!(events[2].name, "click");

    // Synthetic timestamps reconstruct backlog order.
    assert!(events[0].timestamp < events[1].timestamp);
    assert!(events[1].timestamp < events[2].timestamp);
}

#[test]
fn trigger_matches_only_when_every_condition_holds() {
    let host = Arc::new(StaticHost::new("https://shop.example/checkout"));
    let trigger = Trigger {
        id: "1".to_string(),
        name: "Checkout click".to_string(),
        trigger_type: "CustomEvent".to_string(),
        conditions: vec![
            event_equals("event", "click"),
            event_equals("target", "buy-button"),
        ],
    };
    host.set_introspection(Some(Arc::new(StaticIntrospection::new(
        vec![trigger],
        Vec::new(),
    ))));

    let (mut engine, stream) = engine_over(&host);

    // Both conditions hold.
    engine.push(
        CollectionSlot::Primary,
        json!({"event": "click", "target": "buy-button"}),
    );
    // Only one condition holds: no partial credit.
    engine.push(
        CollectionSlot::Primary,
        json!({"event": "click", "target": "nav-link"}),
    );
    engine.run_until(200);

    let events = stream.drain();
    assert_eq!(events.len(), 2);

    let matched = events[0].trigger_analysis.as_ref().unwrap();
    assert!(matched.debug_mode_active);
    assert_eq!(matched.triggered_triggers.len(), 1);
    assert_eq!(matched.triggered_triggers[0].trigger.id, "1");
    assert_eq!(matched.triggered_triggers[0].matched_conditions.len(), 2);

    let unmatched = events[1].trigger_analysis.as_ref().unwrap();
    assert!(unmatched.triggered_triggers.is_empty());
    assert_eq!(unmatched.total_triggers, 1);
}

#[test]
fn tags_sharing_a_trigger_fire_with_one_timestamp() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    let trigger = Trigger {
        id: "9".to_string(),
        name: "Any click".to_string(),
        trigger_type: "CustomEvent".to_string(),
        conditions: vec![event_equals("event", "click")],
    };
    let tags = vec![
        Tag {
            name: "Analytics".to_string(),
            firing_trigger_ids: vec!["9".to_string()],
        },
        Tag {
            name: "Pixel".to_string(),
            firing_trigger_ids: vec!["9".to_string(), "12".to_string()],
        },
        Tag {
            name: "Unrelated".to_string(),
            firing_trigger_ids: vec!["12".to_string()],
        },
    ];
    host.set_introspection(Some(Arc::new(StaticIntrospection::new(
        vec![trigger],
        tags,
    ))));

    let (mut engine, stream) = engine_over(&host);
    engine.push(CollectionSlot::Primary, json!({"event": "click"}));
    engine.run_until(100);

    let events = stream.drain();
    assert_eq!(events.len(), 1);

    let analysis = events[0].trigger_analysis.as_ref().unwrap();
    let fired: Vec<&str> = analysis.fired_tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(fired, vec!["Analytics", "Pixel"]);
    assert_eq!(analysis.fired_tags[0].time, analysis.fired_tags[1].time);
    assert_eq!(analysis.fired_tags[0].trigger_name, "Any click");
    assert_eq!(analysis.total_tags, 3);
}

#[test]
fn event_log_merges_indexed_and_unindexed_duplicates() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    host.seed_collection("_mtm", vec![json!({"event": "mtm.PageView"})]);

    let (mut engine, stream) = engine_over(&host);
    let mut log = engine.event_log();

    // Backlog scan reports the entry with an index...
    engine.run_until(100);
    for event in stream.drain() {
        log.offer(event, engine.now());
    }
    assert_eq!(log.len(), 1);

    // ...then the same logical event arrives unindexed through a native
    // push, after the engine-side window has expired.
    engine.run_until(1100);
    engine.push(CollectionSlot::Primary, json!({"event": "mtm.PageView"}));
    engine.run_until(1200);
    for event in stream.drain() {
        log.offer(event, engine.now());
    }

    // Presentation cache folded the pair: still one logical event.
    assert_eq!(log.len(), 1);
}

#[test]
fn clearing_the_log_drops_in_flight_enrichment() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    let (mut engine, stream) = engine_over(&host);
    let mut log = engine.event_log();

    // Observed but not yet enriched (dispatch is scheduled 50 ticks out).
    engine.push(CollectionSlot::Primary, json!({"event": "click"}));
    log.clear();

    engine.run_until(100);
    assert!(stream.try_recv().is_none());
}

#[test]
fn slow_consumer_drops_are_counted_not_blocking() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    let config = EngineConfig {
        stream_capacity: 2,
        ..EngineConfig::default()
    };
    let host_dyn: Arc<dyn HostEnvironment> = host.clone();
    let (mut engine, stream) = ScopeEngine::new(config, host_dyn);

    for i in 0..5 {
        engine.push(CollectionSlot::Primary, json!({"event": format!("e{i}")}));
    }
    engine.run_until(100);

    assert_eq!(stream.drain().len(), 2);
    assert_eq!(engine.dropped_events(), 3);
}

#[test]
fn repeated_identical_push_is_suppressed_inside_the_window() {
    let host = Arc::new(StaticHost::new("https://shop.example/"));
    let (mut engine, stream) = engine_over(&host);

    engine.push(CollectionSlot::Primary, json!({"event": "click"}));
    engine.push(CollectionSlot::Primary, json!({"event": "click"}));
    engine.run_until(100);

    assert_eq!(stream.drain().len(), 1);
    assert_eq!(engine.duplicates_suppressed(), 1);

    // Past the global window the same entry reports again.
    engine.run_until(1500);
    engine.push(CollectionSlot::Primary, json!({"event": "click"}));
    engine.run_until(1600);
    assert_eq!(stream.drain().len(), 1);
}
