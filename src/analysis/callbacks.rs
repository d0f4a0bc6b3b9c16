//! Callback and async handler resolution.

use std::collections::HashSet;

use tracing::debug;

use super::builder::SemanticModel;
use super::callgraph::CallGraph;
use super::model::AsyncHandler;
use crate::backend::RawFacts;
use crate::error::{Warning, WarningKind};
use crate::knowledge::KnowledgeBase;

/// Context recorded when the knowledge base has nothing to say.
pub const UNKNOWN_CONTEXT: &str = "unknown";

fn is_recognized(context: Option<&str>) -> bool {
    context.is_some_and(|c| c != UNKNOWN_CONTEXT)
}

/// Mark callbacks and collect async handlers. Returns the handlers in
/// registration order, deduplicated by (handler, mechanism).
pub fn resolve(model: &mut SemanticModel, facts: &RawFacts, kb: &KnowledgeBase) -> Vec<AsyncHandler> {
    for mapping in &model.func_ptr_mappings {
        let Some(function) = model.functions.get_mut(&mapping.function) else {
            continue;
        };
        function.is_callback = true;
        if is_recognized(function.callback_context.as_deref()) {
            continue;
        }
        if kb.knows_framework(&mapping.aggregate_type) {
            function.callback_context = Some(format!("{}.{}", mapping.aggregate_type, mapping.field));
            let info = kb.callback(&mapping.aggregate_type, &mapping.field);
            function.callback_trigger = info.map(|i| i.trigger.clone()).filter(|t| !t.is_empty());
            function.execution_context = info.map(|i| i.context.clone()).filter(|c| !c.is_empty());
        } else {
            function.callback_context = Some(UNKNOWN_CONTEXT.to_string());
        }
    }

    let mut handlers = Vec::new();
    let mut seen = HashSet::new();
    let mut unknown_mechanisms = HashSet::new();
    for registration in &facts.async_registrations {
        if !seen.insert((registration.handler.as_str(), registration.mechanism)) {
            continue;
        }
        let mechanism = registration.mechanism.as_str();
        let context = match kb.mechanism_context(mechanism) {
            Some(ctx) => ctx.to_string(),
            None => {
                if unknown_mechanisms.insert(mechanism) {
                    model.warnings.push(
                        Warning::new(
                            WarningKind::UnknownMechanism,
                            format!("no execution context known for async mechanism '{}'", mechanism),
                        )
                        .at(registration.location.clone()),
                    );
                }
                UNKNOWN_CONTEXT.to_string()
            }
        };

        if let Some(function) = model.functions.get_mut(&registration.handler) {
            function.is_callback = true;
            if !is_recognized(function.callback_context.as_deref()) {
                function.callback_context = Some(format!("async.{}", mechanism));
                function.callback_trigger = Some(registration.mechanism.trigger().to_string());
                function.execution_context =
                    Some(context.clone()).filter(|c| c != UNKNOWN_CONTEXT);
            }
        }

        handlers.push(AsyncHandler {
            handler: registration.handler.clone(),
            mechanism: registration.mechanism,
            api: registration.api.clone(),
            location: registration.location.clone(),
            context,
        });
    }

    debug!(
        callbacks = model.functions.values().filter(|f| f.is_callback).count(),
        async_handlers = handlers.len(),
        "callbacks resolved"
    );
    handlers
}

/// Callbacks with a recognized context that nothing in the analyzed code
/// calls, sorted by name.
pub fn entry_points(model: &SemanticModel, graph: &CallGraph) -> Vec<String> {
    model
        .functions
        .values()
        .filter(|f| f.is_callback && is_recognized(f.callback_context.as_deref()))
        .filter(|f| graph.callers_of(&f.name).is_empty())
        .map(|f| f.name.clone())
        .collect()
}
