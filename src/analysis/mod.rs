//! Semantic analysis over backend facts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌───────────────┐
//! │ Source text │──▶│ Backend   │──▶│ RawFacts      │
//! └─────────────┘   └───────────┘   └───────────────┘
//!                                           │
//!                                           ▼
//!                   ┌───────────┐   ┌───────────────┐
//!                   │ Call graph│◀──│ SemanticModel │ (builder)
//!                   └───────────┘   └───────────────┘
//!                         │                 │
//!                         ▼                 ▼
//!                   ┌────────────────────────────┐   ┌────────────────┐
//!                   │ Callback / async resolver  │◀──│ KnowledgeBase  │
//!                   └────────────────────────────┘   └────────────────┘
//!                                 │
//!                                 ▼
//!                          AnalysisResult
//! ```
//!
//! Every stage is a plain function over owned data; the [`Analyzer`] only
//! wires them together and records timing.

pub mod builder;
pub mod callbacks;
pub mod callgraph;
pub mod consteval;
mod context;
pub mod model;
mod result;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

pub use builder::SemanticModel;
pub use callgraph::{CallEdge, CallGraph};
pub use context::{BatchOutcome, FileFailure};
pub use model::{
    AggregateType, AsyncHandler, EnumMember, EnumType, FuncPtrMapping, Function, StructField,
    Symbol, SymbolKind, SymbolTable, Typedef,
};
pub use result::{AnalysisResult, Summary};

use crate::backend::{self, Backend, Capabilities, RawFacts};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::knowledge::KnowledgeBase;
use result::Parts;

/// What a caller asks of an analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub requested: Capabilities,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            requested: Capabilities::PARSE_FUNCTIONS
                | Capabilities::PARSE_AGGREGATES
                | Capabilities::PARSE_ENUMS
                | Capabilities::PARSE_CALLS
                | Capabilities::PARSE_TYPEDEFS,
        }
    }
}

impl AnalysisOptions {
    /// Report calls that resolve to nothing in the analyzed sources.
    pub fn cross_file(mut self, enabled: bool) -> Self {
        self.requested.set(Capabilities::CROSS_FILE, enabled);
        self
    }

    pub fn reports_unresolved(&self) -> bool {
        self.requested.contains(Capabilities::CROSS_FILE)
    }
}

/// A backend, a knowledge base and options. Cheap to clone and safe to
/// share between threads.
#[derive(Clone)]
pub struct Analyzer {
    backend: Arc<dyn Backend>,
    knowledge: Arc<KnowledgeBase>,
    options: AnalysisOptions,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn Backend>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            backend,
            knowledge,
            options: AnalysisOptions::default(),
        }
    }

    /// The selector's default backend with the built-in knowledge base.
    pub fn with_default_backend() -> Result<Self> {
        Ok(Self::new(
            backend::get_backend(None)?,
            Arc::new(KnowledgeBase::builtin()),
        ))
    }

    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let backend = backend::get_backend(config.backend.as_deref())?;
        let knowledge = Arc::new(config.load_knowledge()?);
        Ok(Self::new(backend, knowledge)
            .with_options(AnalysisOptions::default().cross_file(config.cross_file)))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn options(&self) -> AnalysisOptions {
        self.options
    }

    /// Analyze `source`; `filename` only labels locations.
    pub fn analyze_source(&self, source: &str, filename: &str) -> Result<AnalysisResult> {
        let started = Instant::now();
        debug!(file = filename, backend = self.backend.name(), "analyzing");
        let missing = self.options.requested - self.backend.capabilities() - Capabilities::CROSS_FILE;
        if !missing.is_empty() {
            debug!(backend = self.backend.name(), missing = %missing, "capabilities not offered");
        }

        let facts = self.backend.parse(source, filename)?;
        let result = self.finish(filename.to_string(), &facts, self.options, started);
        info!(
            file = filename,
            backend = result.backend_used(),
            elapsed_ms = result.analysis_time().as_millis() as u64,
            warnings = result.warnings().len(),
            "analysis finished"
        );
        Ok(result)
    }

    pub fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<AnalysisResult> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyze_source(&source, &path.to_string_lossy())
    }

    /// Build, link and resolve already-parsed facts.
    pub(crate) fn finish(
        &self,
        label: String,
        facts: &RawFacts,
        options: AnalysisOptions,
        started: Instant,
    ) -> AnalysisResult {
        let mut model = builder::build(facts);
        let call_graph = callgraph::build(&mut model, facts, options.reports_unresolved());
        let async_handlers = callbacks::resolve(&mut model, facts, &self.knowledge);
        let entry_points = callbacks::entry_points(&model, &call_graph);
        for warning in &model.warnings {
            debug!(kind = warning.kind.as_str(), "{}", warning.message);
        }
        AnalysisResult::assemble(Parts {
            file: label,
            model,
            call_graph,
            async_handlers,
            entry_points,
            backend_used: self.backend.name(),
            backend_version: self.backend.version(),
            analysis_time: started.elapsed(),
        })
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("backend", &self.backend.name())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeuristicBackend;
    use crate::error::WarningKind;

    const DRIVER: &str = r#"
static int helper(int x) { return x + 1; }

static int my_probe(struct usb_interface *intf, const struct usb_device_id *id)
{
    return helper(0) + usb_register_dev(intf, 0);
}

static struct usb_driver my_driver = {
    .name = "mine",
    .probe = my_probe,
};
"#;

    fn heuristic() -> Analyzer {
        Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(KnowledgeBase::builtin()))
    }

    #[test]
    fn test_analyze_source() {
        let result = heuristic().analyze_source(DRIVER, "drv.c").unwrap();
        assert_eq!(result.file(), "drv.c");
        assert_eq!(result.backend_used(), "heuristic");
        let probe = result.function("my_probe").unwrap();
        assert!(probe.is_callback);
        assert_eq!(probe.callback_context.as_deref(), Some("usb_driver.probe"));
        assert_eq!(result.called_by("helper"), vec!["my_probe"]);
        assert_eq!(result.entry_points(), ["my_probe".to_string()]);
        assert!(result
            .warnings()
            .iter()
            .all(|w| w.kind != WarningKind::UnresolvedCall));
    }

    #[test]
    fn test_cross_file_reports_unresolved() {
        let analyzer = heuristic().with_options(AnalysisOptions::default().cross_file(true));
        let result = analyzer.analyze_source(DRIVER, "drv.c").unwrap();
        let unresolved: Vec<_> = result
            .warnings()
            .iter()
            .filter(|w| w.kind == WarningKind::UnresolvedCall)
            .collect();
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved[0].message.contains("usb_register_dev"));
    }

    #[test]
    fn test_analyze_missing_file() {
        let err = heuristic().analyze_file("/nonexistent/driver.c").unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    #[test]
    fn test_from_config() {
        let config = AnalyzerConfig {
            backend: Some("heuristic".to_string()),
            builtin_knowledge: false,
            cross_file: true,
            ..AnalyzerConfig::default()
        };
        let analyzer = Analyzer::from_config(&config).unwrap();
        assert_eq!(analyzer.backend().name(), "heuristic");
        assert!(analyzer.knowledge().is_empty());
        assert!(analyzer.options().reports_unresolved());

        let result = analyzer.analyze_source(DRIVER, "drv.c").unwrap();
        let probe = result.function("my_probe").unwrap();
        assert_eq!(probe.callback_context.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_from_config_unknown_backend() {
        let config = AnalyzerConfig {
            backend: Some("clang".to_string()),
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            Analyzer::from_config(&config),
            Err(AnalysisError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn test_options_toggle() {
        let options = AnalysisOptions::default().cross_file(true);
        assert!(options.reports_unresolved());
        assert!(!options.cross_file(false).reports_unresolved());
    }
}
