//! Tests for the serialized output format.
//!
//! Consumers read the JSON produced by `driverscope analyze -f json`, so
//! the top-level keys and per-record shapes are checked here.

use std::path::PathBuf;
use std::sync::Arc;

use driverscope::backend::HeuristicBackend;
use driverscope::report;
use driverscope::{Analyzer, KnowledgeBase};
use serde_json::Value;

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn fixture_json(name: &str) -> Value {
    let analyzer =
        Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(KnowledgeBase::builtin()));
    let result = analyzer
        .analyze_file(testdata_path().join(name))
        .expect("fixture should analyze");
    let mut buf = Vec::new();
    report::write_json(&mut buf, &result).expect("should serialize");
    serde_json::from_slice(&buf).expect("output should be valid JSON")
}

#[test]
fn test_top_level_keys() {
    let json = fixture_json("usb_driver.c");
    let object = json.as_object().unwrap();
    for key in [
        "file",
        "functions",
        "structs",
        "unions",
        "enums",
        "typedefs",
        "symbols",
        "call_graph",
        "async_handlers",
        "func_ptr_mappings",
        "entry_points",
        "backend_used",
        "backend_version",
        "analysis_time",
        "warnings",
    ] {
        assert!(object.contains_key(key), "missing key {}", key);
    }
    assert_eq!(json["backend_used"], "heuristic");
    assert!(json["analysis_time"].as_f64().unwrap() >= 0.0);
}

#[test]
fn test_function_record_shape() {
    let json = fixture_json("usb_driver.c");
    let disconnect = &json["functions"]["skel_disconnect"];
    assert_eq!(disconnect["name"], "skel_disconnect");
    assert_eq!(disconnect["is_callback"], true);
    assert_eq!(disconnect["callback_context"], "usb_driver.disconnect");
    assert!(disconnect["callback_trigger"].is_string());

    let calls: Vec<&str> = disconnect["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(calls.contains(&"skel_delete"));
    assert!(calls.contains(&"usb_get_intfdata"));

    let delete = &json["functions"]["skel_delete"];
    assert_eq!(delete["called_by"], serde_json::json!(["skel_disconnect"]));
    assert_eq!(delete["is_callback"], false);
}

#[test]
fn test_call_graph_edges() {
    let json = fixture_json("usb_driver.c");
    let edges = json["call_graph"].as_array().unwrap();
    let edge = edges
        .iter()
        .find(|e| e["caller"] == "skel_disconnect" && e["callee"] == "skel_delete")
        .expect("direct edge should be present");
    assert_eq!(edge["is_direct"], true);
    assert!(edge["location"]["start_line"].as_u64().unwrap() > 0);
}

#[test]
fn test_enum_members_are_ordered_pairs() {
    let json = fixture_json("advanced_driver.c");
    let members = json["enums"]["device_state"]["members"].as_array().unwrap();
    let pairs: Vec<(&str, i64)> = members
        .iter()
        .map(|m| (m["name"].as_str().unwrap(), m["value"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("STATE_IDLE", 0),
            ("STATE_ACTIVE", 1),
            ("STATE_SUSPENDED", 10),
            ("STATE_ERROR", 11)
        ]
    );
}

#[test]
fn test_async_handler_records() {
    let json = fixture_json("async_driver.c");
    let handlers = json["async_handlers"].as_array().unwrap();
    let irq = handlers
        .iter()
        .find(|h| h["handler"] == "sensor_irq_thread")
        .unwrap();
    assert_eq!(irq["mechanism"], "threaded_irq");
    assert_eq!(irq["api"], "request_threaded_irq");
    assert_eq!(irq["context"], "process");

    let mappings = json["func_ptr_mappings"].as_array().unwrap();
    assert!(mappings
        .iter()
        .any(|m| m["aggregate_type"] == "platform_driver" && m["field"] == "remove"));
}
