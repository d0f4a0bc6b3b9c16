//! End-to-end analysis tests: model building, call graph, callback and
//! async resolution, backend selection and batch analysis.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use driverscope::backend::{
    AsyncMechanism, Backend, BackendKind, BackendSelector, Capabilities, HeuristicBackend,
    RawFacts,
};
use driverscope::{AnalysisError, AnalysisResult, Analyzer, KnowledgeBase, WarningKind};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn heuristic() -> Analyzer {
    Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(KnowledgeBase::builtin()))
}

fn json_without_time(result: &AnalysisResult) -> serde_json::Value {
    let mut value = serde_json::to_value(result).unwrap();
    value.as_object_mut().unwrap().remove("analysis_time");
    value
}

// =============================================================================
// Determinism and precedence
// =============================================================================

#[test]
fn test_repeated_analysis_is_identical() {
    let path = testdata_path().join("advanced_driver.c");
    for kind in BackendKind::PRIORITY {
        let backend = kind.instance();
        if !backend.is_available() {
            continue;
        }
        let analyzer = Analyzer::new(backend, Arc::new(KnowledgeBase::builtin()));
        let first = analyzer.analyze_file(&path).unwrap();
        let second = analyzer.analyze_file(&path).unwrap();
        assert_eq!(json_without_time(&first), json_without_time(&second), "{}", kind);
    }
}

#[test]
fn test_definition_wins_over_prototype_in_any_order() {
    let before = "static int reset(int dev);\n\
                  static int reset(int dev)\n{\n    return dev;\n}\n";
    let after = "static int reset(int dev)\n{\n    return dev;\n}\n\
                 static int reset(int dev);\n";

    for source in [before, after] {
        let result = heuristic().analyze_source(source, "order.c").unwrap();
        let reset = result.function("reset").unwrap();
        assert!(!reset.is_declaration);
        assert!(reset.body.is_some());
        assert_eq!(result.declarations().count(), 0);
    }
}

#[test]
fn test_enum_value_derivation() {
    let result = heuristic()
        .analyze_source("enum letters { A, B, C = 10, D };\n", "enum.c")
        .unwrap();
    let letters = &result.enums()["letters"];
    let values: Vec<_> = letters.members.iter().map(|m| (m.name.as_str(), m.value)).collect();
    assert_eq!(
        values,
        vec![("A", Some(0)), ("B", Some(1)), ("C", Some(10)), ("D", Some(11))]
    );
}

fn deeply_nested_enum(depth: usize) -> String {
    format!(
        "enum deep {{ FIRST = {}1{}, NEXT }};\nint after(void)\n{{\n    return 0;\n}}\n",
        "(".repeat(depth),
        ")".repeat(depth)
    )
}

#[test]
fn test_deeply_nested_enum_initializer_is_unevaluated() {
    let result = heuristic()
        .analyze_source(&deeply_nested_enum(200_000), "deep.c")
        .unwrap();
    let deep = &result.enums()["deep"];
    assert_eq!(deep.value_of("FIRST"), None);
    assert_eq!(deep.value_of("NEXT"), None);
    assert!(result.function("after").is_some());
}

#[test]
#[cfg(feature = "tree-sitter")]
fn test_deeply_nested_enum_initializer_syntax_tree() {
    let analyzer = Analyzer::new(
        BackendKind::SyntaxTree.instance(),
        Arc::new(KnowledgeBase::builtin()),
    );
    let result = analyzer
        .analyze_source(&deeply_nested_enum(2_000), "deep.c")
        .unwrap();
    assert_eq!(result.enums()["deep"].value_of("FIRST"), None);
    assert!(result.function("after").is_some());
    assert!(result
        .warnings()
        .iter()
        .any(|w| w.kind == WarningKind::UnsupportedConstruct));
}

// =============================================================================
// Callbacks and async handlers
// =============================================================================

#[test]
fn test_known_framework_probe_is_callback() {
    let source = "static int my_probe(struct usb_interface *intf, const struct usb_device_id *id)\n\
                  {\n    return 0;\n}\n\
                  static struct usb_driver my_driver = {\n    .probe = my_probe,\n};\n";
    let result = heuristic().analyze_source(source, "probe.c").unwrap();
    let probe = result.function("my_probe").unwrap();
    assert!(probe.is_callback);
    let context = probe.callback_context.as_deref().unwrap();
    assert_ne!(context, "unknown");
    assert_eq!(context, "usb_driver.probe");
    assert_eq!(result.func_ptr_mappings().len(), 1);
    assert_eq!(result.func_ptr_mappings()[0].variable, "my_driver");
}

#[test]
fn test_usb_driver_fixture() {
    let result = heuristic()
        .analyze_file(testdata_path().join("usb_driver.c"))
        .unwrap();

    let contexts: Vec<_> = ["skel_probe", "skel_disconnect", "skel_open", "skel_release"]
        .iter()
        .map(|name| result.function(name).unwrap().callback_context.clone().unwrap())
        .collect();
    assert_eq!(
        contexts,
        vec![
            "usb_driver.probe",
            "usb_driver.disconnect",
            "file_operations.open",
            "file_operations.release"
        ]
    );
    let init = result.function("usb_skel_init").unwrap();
    assert_eq!(init.callback_context.as_deref(), Some("module.init"));
    assert_eq!(result.called_by("skel_delete"), vec!["skel_disconnect"]);

    let entries: BTreeSet<_> = result.entry_points().iter().map(String::as_str).collect();
    assert!(entries.contains("usb_skel_init"));
    assert!(entries.contains("skel_probe"));
    assert!(!entries.contains("skel_delete"));
}

fn assert_async_fixture(result: &AnalysisResult) {
    let handlers: BTreeSet<_> = result
        .async_handlers()
        .iter()
        .map(|h| (h.handler.as_str(), h.mechanism, h.context.as_str()))
        .collect();
    let expected: BTreeSet<_> = [
        ("reset_work_fn", AsyncMechanism::Work, "process"),
        ("sensor_rx_work", AsyncMechanism::Work, "process"),
        ("sensor_tasklet", AsyncMechanism::Tasklet, "softirq"),
        ("sensor_poll", AsyncMechanism::Timer, "softirq"),
        ("sensor_sample", AsyncMechanism::Hrtimer, "hardirq"),
        ("sensor_irq", AsyncMechanism::Irq, "hardirq"),
        ("sensor_irq_thread", AsyncMechanism::ThreadedIrq, "process"),
        ("sensor_thread", AsyncMechanism::Kthread, "process"),
    ]
    .into_iter()
    .collect();
    assert_eq!(handlers, expected);

    let tasklet = result.function("sensor_tasklet").unwrap();
    assert!(tasklet.is_callback);
    assert_eq!(tasklet.callback_context.as_deref(), Some("async.tasklet"));
    assert_eq!(tasklet.execution_context.as_deref(), Some("softirq"));
    assert_eq!(
        tasklet.callback_trigger.as_deref(),
        Some(AsyncMechanism::Tasklet.trigger())
    );

    let probe = result.function("sensor_probe").unwrap();
    assert_eq!(probe.callback_context.as_deref(), Some("platform_driver.probe"));
    assert_eq!(
        result.function("sensor_exit").unwrap().callback_context.as_deref(),
        Some("module.exit")
    );
}

#[test]
fn test_async_fixture_heuristic() {
    let result = heuristic()
        .analyze_file(testdata_path().join("async_driver.c"))
        .unwrap();
    assert_async_fixture(&result);
}

#[test]
#[cfg(feature = "tree-sitter")]
fn test_async_fixture_syntax_tree() {
    let analyzer = Analyzer::new(
        BackendKind::SyntaxTree.instance(),
        Arc::new(KnowledgeBase::builtin()),
    );
    let result = analyzer
        .analyze_file(testdata_path().join("async_driver.c"))
        .unwrap();
    assert_async_fixture(&result);
}

#[test]
fn test_knowledge_base_file_overrides_builtin() {
    let kb = KnowledgeBase::from_path(testdata_path().join("knowledge_base.json"))
        .unwrap()
        .merged_over(&KnowledgeBase::builtin());
    assert_eq!(
        kb.callback("usb_driver", "probe").unwrap().trigger,
        "device plugged in and matched"
    );
    assert!(kb.callback("usb_driver", "suspend").is_some());

    let analyzer = Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(kb));
    let result = analyzer
        .analyze_file(testdata_path().join("async_driver.c"))
        .unwrap();
    let rx = result
        .async_handlers()
        .iter()
        .find(|h| h.handler == "sensor_rx_work")
        .unwrap();
    assert_eq!(rx.context, "process (workqueue)");
}

#[test]
fn test_empty_knowledge_base_marks_unknown() {
    let analyzer = Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(KnowledgeBase::empty()));
    let result = analyzer
        .analyze_file(testdata_path().join("usb_driver.c"))
        .unwrap();
    let probe = result.function("skel_probe").unwrap();
    assert!(probe.is_callback);
    assert_eq!(probe.callback_context.as_deref(), Some("unknown"));
    assert!(result.entry_points().is_empty());
}

// =============================================================================
// Backend selection
// =============================================================================

struct Unavailable;

impl Backend for Unavailable {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn parse(&self, _source: &str, filename: &str) -> driverscope::Result<RawFacts> {
        Err(AnalysisError::BackendUnavailable(filename.to_string()))
    }
}

#[test]
fn test_selector_falls_back_to_next_available() {
    let selector = BackendSelector::new(vec![
        Arc::new(Unavailable) as Arc<dyn Backend>,
        Arc::new(HeuristicBackend::new()) as Arc<dyn Backend>,
    ]);
    let chosen = selector.default_backend().unwrap();
    assert_eq!(chosen.name(), "heuristic");
    assert_eq!(selector.available(), vec!["heuristic"]);

    let analyzer = Analyzer::new(chosen, Arc::new(KnowledgeBase::builtin()));
    let result = analyzer.analyze_source("void f(void)\n{\n}\n", "f.c").unwrap();
    assert_eq!(result.backend_used(), "heuristic");
}

#[test]
fn test_unknown_backend_name() {
    let Err(err) = driverscope::get_backend(Some("clang")) else {
        panic!("'clang' should not name a backend");
    };
    assert!(matches!(err, AnalysisError::UnknownBackend { .. }));
    assert!(driverscope::list_backends().contains(&"heuristic"));
}

// =============================================================================
// Batch analysis
// =============================================================================

#[test]
fn test_batch_over_fixtures() {
    let paths = vec![
        testdata_path().join("usb_driver.c"),
        testdata_path().join("async_driver.c"),
    ];
    let outcome = heuristic().analyze_batch("testdata", &paths);
    assert!(outcome.failures.is_empty());

    let result = &outcome.result;
    assert!(result.function("skel_probe").is_some());
    assert!(result.function("sensor_probe").is_some());
    assert!(result
        .warnings()
        .iter()
        .any(|w| w.kind == WarningKind::UnresolvedCall));
}
