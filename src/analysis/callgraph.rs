//! Call graph construction and queries.
//!
//! Direct calls name a known function. Anything else goes through indirect
//! resolution, in order:
//!
//! 1. the latest assignment to that name earlier in the caller's own body;
//! 2. for plain identifiers, the last file-scope assignment to that name;
//! 3. for member calls, every function ever stored into a field of that name.
//!
//! Unresolved names stay in the caller's outgoing list as external symbols.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Serialize, Serializer};

use super::builder::SemanticModel;
use crate::backend::{CallSite, Location, PointerAssignment, RawFacts};
use crate::error::{Warning, WarningKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub is_direct: bool,
    pub location: Location,
}

/// Functions and the resolved calls between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallGraph {
    nodes: BTreeSet<String>,
    edges: Vec<CallEdge>,
}

impl Serialize for CallGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.edges)
    }
}

impl CallGraph {
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    /// Distinct callees of `name`, in first-call order.
    pub fn callees_of(&self, name: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for edge in self.edges.iter().filter(|e| e.caller == name) {
            if !out.contains(&edge.callee.as_str()) {
                out.push(&edge.callee);
            }
        }
        out
    }

    /// Distinct callers of `name`, sorted.
    pub fn callers_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.callee == name)
            .map(|e| e.caller.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Shortest call chain from `from` to `to`, both ends included.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let (graph, index) = self.to_petgraph();
        let (&start, &goal) = (index.get(from)?, index.get(to)?);
        let (_, path) = astar(&graph, start, |n| n == goal, |_| 1u32, |_| 0)?;
        Some(path.into_iter().map(|n| graph[n].clone()).collect())
    }

    fn to_petgraph(&self) -> (DiGraph<String, ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for node in &self.nodes {
            index.insert(node.as_str(), graph.add_node(node.clone()));
        }
        let mut seen = HashSet::new();
        for edge in &self.edges {
            if !seen.insert((edge.caller.as_str(), edge.callee.as_str())) {
                continue;
            }
            if let (Some(&a), Some(&b)) = (index.get(edge.caller.as_str()), index.get(edge.callee.as_str())) {
                graph.add_edge(a, b, ());
            }
        }
        (graph, index)
    }

    fn push(&mut self, caller: &str, callee: &str, is_direct: bool, location: &Location) {
        self.nodes.insert(caller.to_string());
        self.nodes.insert(callee.to_string());
        self.edges.push(CallEdge {
            caller: caller.to_string(),
            callee: callee.to_string(),
            is_direct,
            location: location.clone(),
        });
    }
}

/// Resolve every call site in `facts` against `model`, filling each
/// function's outgoing call names. `report_unresolved` adds an
/// `UnresolvedCall` warning per distinct external name.
pub fn build(model: &mut SemanticModel, facts: &RawFacts, report_unresolved: bool) -> CallGraph {
    let mut graph = CallGraph::default();
    graph.nodes.extend(model.functions.keys().cloned());

    let mut outgoing: Vec<(String, String)> = Vec::new();
    let mut unresolved: Vec<(String, Location)> = Vec::new();
    let mut ambiguous: Vec<Warning> = Vec::new();

    for call in &facts.calls {
        let Some(caller) = model.functions.get(&call.caller) else {
            continue;
        };
        if !in_body(caller.body.as_ref(), &call.location) {
            continue;
        }

        if !call.is_member_call() && model.functions.contains_key(&call.callee) {
            graph.push(&call.caller, &call.callee, true, &call.location);
            outgoing.push((call.caller.clone(), call.callee.clone()));
            continue;
        }

        let targets = indirect_targets(model, facts, call);
        if targets.len() > 1 {
            ambiguous.push(
                Warning::new(
                    WarningKind::AmbiguousCallback,
                    format!(
                        "'{}' in {} may call any of: {}",
                        call.callee,
                        call.caller,
                        targets.join(", ")
                    ),
                )
                .at(call.location.clone()),
            );
        }
        if targets.is_empty() {
            outgoing.push((call.caller.clone(), call.callee.clone()));
            if !unresolved.iter().any(|(name, _)| name == &call.callee) {
                unresolved.push((call.callee.clone(), call.location.clone()));
            }
        }
        for target in targets {
            graph.push(&call.caller, &target, false, &call.location);
            outgoing.push((call.caller.clone(), target));
        }
    }

    for (caller, callee) in outgoing {
        if let Some(function) = model.functions.get_mut(&caller) {
            function.add_call(&callee);
        }
    }
    model.warnings.extend(ambiguous);
    if report_unresolved {
        for (name, location) in unresolved {
            model.warnings.push(
                Warning::new(
                    WarningKind::UnresolvedCall,
                    format!("'{}' is not defined in the analyzed sources", name),
                )
                .at(location),
            );
        }
    }
    graph
}

fn in_body(body: Option<&Location>, at: &Location) -> bool {
    let Some(body) = body else { return false };
    body.file == at.file
        && (body.start_line, body.start_column) <= (at.start_line, at.start_column)
        && (at.start_line, at.start_column) <= (body.end_line, body.end_column)
}

fn indirect_targets(model: &SemanticModel, facts: &RawFacts, call: &CallSite) -> Vec<String> {
    let known = |a: &&PointerAssignment| model.functions.contains_key(&a.value);
    let named = |a: &&PointerAssignment| a.target == call.callee;

    let local = facts
        .pointer_assignments
        .iter()
        .filter(named)
        .filter(known)
        .filter(|a| a.scope.as_deref() == Some(call.caller.as_str()))
        .filter(|a| a.location.file == call.location.file && a.location.precedes(&call.location))
        .last();
    if let Some(assignment) = local {
        return vec![assignment.value.clone()];
    }

    if !call.is_member_call() {
        return facts
            .pointer_assignments
            .iter()
            .filter(named)
            .filter(known)
            .filter(|a| a.scope.is_none() && a.receiver.is_none())
            .last()
            .map(|a| vec![a.value.clone()])
            .unwrap_or_default();
    }

    let mut targets: Vec<String> = Vec::new();
    let mapped = model
        .func_ptr_mappings
        .iter()
        .filter(|m| m.field == call.callee)
        .map(|m| &m.function);
    let assigned = facts
        .pointer_assignments
        .iter()
        .filter(named)
        .filter(known)
        .filter(|a| a.receiver.is_some())
        .map(|a| &a.value);
    for function in mapped.chain(assigned) {
        if model.functions.contains_key(function) && !targets.contains(function) {
            targets.push(function.clone());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::builder;
    use crate::backend::{FieldAssignment, FunctionFact};

    fn loc(line: usize) -> Location {
        Location::new("drv.c", line, 4, line, 20)
    }

    fn defined(name: &str, start: usize, end: usize) -> FunctionFact {
        FunctionFact {
            name: name.to_string(),
            return_type: "void".to_string(),
            params: Vec::new(),
            attributes: Vec::new(),
            location: loc(start),
            body: Some(Location::new("drv.c", start, 0, end, 1)),
            type_refs: Vec::new(),
        }
    }

    fn call(caller: &str, callee: &str, receiver: Option<&str>, line: usize) -> CallSite {
        CallSite {
            caller: caller.to_string(),
            callee: callee.to_string(),
            receiver: receiver.map(str::to_string),
            location: loc(line),
        }
    }

    fn assign(scope: Option<&str>, target: &str, receiver: Option<&str>, value: &str, line: usize) -> PointerAssignment {
        PointerAssignment {
            scope: scope.map(str::to_string),
            target: target.to_string(),
            receiver: receiver.map(str::to_string),
            value: value.to_string(),
            location: loc(line),
        }
    }

    fn graph_for(facts: &RawFacts, report: bool) -> (SemanticModel, CallGraph) {
        let mut model = builder::build(facts);
        let graph = build(&mut model, facts, report);
        (model, graph)
    }

    #[test]
    fn test_direct_and_external_calls() {
        let facts = RawFacts {
            functions: vec![defined("a", 1, 5), defined("b", 6, 9)],
            calls: vec![call("a", "b", None, 2), call("a", "kmalloc", None, 3), call("a", "b", None, 4)],
            ..RawFacts::default()
        };
        let (model, graph) = graph_for(&facts, false);
        assert_eq!(graph.edges().len(), 2);
        assert!(graph.edges().iter().all(|e| e.is_direct));
        assert_eq!(graph.callees_of("a"), vec!["b"]);
        assert_eq!(graph.callers_of("b"), vec!["a"]);
        assert_eq!(model.functions["a"].calls, vec!["b", "kmalloc"]);
        assert!(model.warnings.is_empty());

        let (model, _) = graph_for(&facts, true);
        assert_eq!(model.warnings.len(), 1);
        assert_eq!(model.warnings[0].kind, WarningKind::UnresolvedCall);
    }

    #[test]
    fn test_local_assignment_wins() {
        let facts = RawFacts {
            functions: vec![defined("run", 1, 10), defined("fast", 11, 12), defined("slow", 13, 14)],
            calls: vec![call("run", "handler", None, 5)],
            pointer_assignments: vec![
                assign(None, "handler", None, "slow", 0),
                assign(Some("run"), "handler", None, "fast", 3),
                assign(Some("run"), "handler", None, "slow", 7),
            ],
            ..RawFacts::default()
        };
        let (_, graph) = graph_for(&facts, false);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0].callee, "fast");
        assert!(!graph.edges()[0].is_direct);
    }

    #[test]
    fn test_file_scope_assignment_fallback() {
        let facts = RawFacts {
            functions: vec![defined("run", 1, 10), defined("slow", 13, 14)],
            calls: vec![call("run", "handler", None, 5)],
            pointer_assignments: vec![assign(None, "handler", None, "slow", 0)],
            ..RawFacts::default()
        };
        let (_, graph) = graph_for(&facts, false);
        assert_eq!(graph.callees_of("run"), vec!["slow"]);
    }

    #[test]
    fn test_member_call_candidates() {
        let facts = RawFacts {
            functions: vec![
                defined("dispatch", 1, 10),
                defined("on_a", 11, 12),
                defined("on_b", 13, 14),
            ],
            calls: vec![call("dispatch", "notify", Some("dev->ops"), 5)],
            field_assignments: vec![FieldAssignment {
                aggregate_type: "acme_ops".to_string(),
                variable: "ops_a".to_string(),
                field: "notify".to_string(),
                value: "on_a".to_string(),
                location: loc(20),
            }],
            pointer_assignments: vec![assign(Some("other"), "notify", Some("dev"), "on_b", 30)],
            ..RawFacts::default()
        };
        let (model, graph) = graph_for(&facts, false);
        assert_eq!(graph.callees_of("dispatch"), vec!["on_a", "on_b"]);
        assert!(model
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::AmbiguousCallback));
        assert_eq!(graph.callers_of("on_b"), vec!["dispatch"]);
    }

    #[test]
    fn test_path() {
        let facts = RawFacts {
            functions: vec![defined("a", 1, 5), defined("b", 6, 9), defined("c", 10, 12)],
            calls: vec![call("a", "b", None, 2), call("b", "c", None, 7)],
            ..RawFacts::default()
        };
        let (_, graph) = graph_for(&facts, false);
        assert_eq!(graph.path("a", "c").unwrap(), vec!["a", "b", "c"]);
        assert!(graph.path("c", "a").is_none());
        assert!(graph.path("a", "missing").is_none());
    }
}
