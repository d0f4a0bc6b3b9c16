//! The immutable product of an analysis pass.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::builder::SemanticModel;
use super::callgraph::CallGraph;
use super::model::{AggregateType, AsyncHandler, EnumType, FuncPtrMapping, Function, SymbolTable, Typedef};
use crate::error::Warning;

/// Everything known about one analyzed source (or batch of sources).
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    file: String,
    symbols: SymbolTable,
    functions: BTreeMap<String, Function>,
    structs: BTreeMap<String, AggregateType>,
    unions: BTreeMap<String, AggregateType>,
    enums: BTreeMap<String, EnumType>,
    typedefs: BTreeMap<String, Typedef>,
    call_graph: CallGraph,
    async_handlers: Vec<AsyncHandler>,
    func_ptr_mappings: Vec<FuncPtrMapping>,
    entry_points: Vec<String>,
    warnings: Vec<Warning>,
    backend_used: &'static str,
    backend_version: &'static str,
    analysis_time: Duration,
}

/// Counts for reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub functions: usize,
    pub declarations: usize,
    pub structs: usize,
    pub unions: usize,
    pub enums: usize,
    pub callbacks: usize,
    pub async_handlers: usize,
    pub call_edges: usize,
    pub warnings: usize,
    /// Callback names grouped by framework type or `async.<mechanism>`.
    pub callback_groups: BTreeMap<String, Vec<String>>,
}

pub(crate) struct Parts {
    pub file: String,
    pub model: SemanticModel,
    pub call_graph: CallGraph,
    pub async_handlers: Vec<AsyncHandler>,
    pub entry_points: Vec<String>,
    pub backend_used: &'static str,
    pub backend_version: &'static str,
    pub analysis_time: Duration,
}

impl AnalysisResult {
    pub(crate) fn assemble(parts: Parts) -> Self {
        let model = parts.model;
        Self {
            file: parts.file,
            symbols: model.symbols,
            functions: model.functions,
            structs: model.structs,
            unions: model.unions,
            enums: model.enums,
            typedefs: model.typedefs,
            call_graph: parts.call_graph,
            async_handlers: parts.async_handlers,
            func_ptr_mappings: model.func_ptr_mappings,
            entry_points: parts.entry_points,
            warnings: model.warnings,
            backend_used: parts.backend_used,
            backend_version: parts.backend_version,
            analysis_time: parts.analysis_time,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn functions(&self) -> &BTreeMap<String, Function> {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Body-bearing functions only.
    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values().filter(|f| !f.is_declaration)
    }

    /// Functions that were declared but never defined.
    pub fn declarations(&self) -> impl Iterator<Item = &Function> {
        self.functions.values().filter(|f| f.is_declaration)
    }

    pub fn structs(&self) -> &BTreeMap<String, AggregateType> {
        &self.structs
    }

    pub fn unions(&self) -> &BTreeMap<String, AggregateType> {
        &self.unions
    }

    pub fn enums(&self) -> &BTreeMap<String, EnumType> {
        &self.enums
    }

    pub fn typedefs(&self) -> &BTreeMap<String, Typedef> {
        &self.typedefs
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// Callers of `name`, derived from the call graph.
    pub fn called_by(&self, name: &str) -> Vec<&str> {
        self.call_graph.callers_of(name)
    }

    pub fn async_handlers(&self) -> &[AsyncHandler] {
        &self.async_handlers
    }

    pub fn func_ptr_mappings(&self) -> &[FuncPtrMapping] {
        &self.func_ptr_mappings
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn backend_used(&self) -> &'static str {
        self.backend_used
    }

    pub fn backend_version(&self) -> &'static str {
        self.backend_version
    }

    pub fn analysis_time(&self) -> Duration {
        self.analysis_time
    }

    pub fn summary(&self) -> Summary {
        let mut callback_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for function in self.functions.values().filter(|f| f.is_callback) {
            let context = function.callback_context.as_deref().unwrap_or("unknown");
            let group = if context.starts_with("async.") {
                context.to_string()
            } else {
                context.split('.').next().unwrap_or(context).to_string()
            };
            callback_groups.entry(group).or_default().push(function.name.clone());
        }
        Summary {
            functions: self.definitions().count(),
            declarations: self.declarations().count(),
            structs: self.structs.len(),
            unions: self.unions.len(),
            enums: self.enums.len(),
            callbacks: self.functions.values().filter(|f| f.is_callback).count(),
            async_handlers: self.async_handlers.len(),
            call_edges: self.call_graph.edges().len(),
            warnings: self.warnings.len(),
            callback_groups,
        }
    }
}

/// A function together with its derived callers.
struct FunctionView<'a> {
    function: &'a Function,
    called_by: Vec<&'a str>,
}

impl Serialize for FunctionView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            #[serde(flatten)]
            function: &'a Function,
            called_by: &'a [&'a str],
        }
        View {
            function: self.function,
            called_by: &self.called_by,
        }
        .serialize(serializer)
    }
}

struct FunctionsView<'a>(&'a AnalysisResult);

impl Serialize for FunctionsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.functions.len()))?;
        for (name, function) in &self.0.functions {
            let view = FunctionView {
                function,
                called_by: self.0.called_by(name),
            };
            map.serialize_entry(name, &view)?;
        }
        map.end()
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Output<'a> {
            file: &'a str,
            functions: FunctionsView<'a>,
            structs: &'a BTreeMap<String, AggregateType>,
            unions: &'a BTreeMap<String, AggregateType>,
            enums: &'a BTreeMap<String, EnumType>,
            typedefs: &'a BTreeMap<String, Typedef>,
            symbols: &'a SymbolTable,
            call_graph: &'a CallGraph,
            async_handlers: &'a [AsyncHandler],
            func_ptr_mappings: &'a [FuncPtrMapping],
            entry_points: &'a [String],
            summary: Summary,
            backend_used: &'a str,
            backend_version: &'a str,
            analysis_time: f64,
            warnings: &'a [Warning],
        }
        Output {
            file: &self.file,
            functions: FunctionsView(self),
            structs: &self.structs,
            unions: &self.unions,
            enums: &self.enums,
            typedefs: &self.typedefs,
            symbols: &self.symbols,
            call_graph: &self.call_graph,
            async_handlers: &self.async_handlers,
            func_ptr_mappings: &self.func_ptr_mappings,
            entry_points: &self.entry_points,
            summary: self.summary(),
            backend_used: self.backend_used,
            backend_version: self.backend_version,
            analysis_time: self.analysis_time.as_secs_f64(),
            warnings: &self.warnings,
        }
        .serialize(serializer)
    }
}
