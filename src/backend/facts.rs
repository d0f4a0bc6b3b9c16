//! Raw facts produced by parsing backends.
//!
//! Facts are backend-neutral and deliberately unmerged: a function that is
//! declared and later defined shows up twice, once per occurrence. The
//! semantic model builder is responsible for deduplication.

use std::fmt;

use serde::Serialize;

use crate::error::Warning;

/// A source span. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Location {
    /// Build a location, clamping the end so it never precedes the start.
    pub fn new(
        file: impl Into<String>,
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        let (end_line, end_column) = if (end_line, end_column) < (start_line, start_column) {
            (start_line, start_column)
        } else {
            (end_line, end_column)
        };
        Self {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Create a location from a tree-sitter node.
    #[cfg(feature = "tree-sitter")]
    pub fn from_node(node: tree_sitter::Node, file: &str) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self::new(file, start.row + 1, start.column, end.row + 1, end.column)
    }

    /// Returns true if this span starts before `other` does.
    pub fn precedes(&self, other: &Location) -> bool {
        (self.start_line, self.start_column) < (other.start_line, other.start_column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_column)
    }
}

/// A function parameter. Unnamed prototype parameters have an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_text: String,
}

/// A function definition or declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionFact {
    pub name: String,
    pub return_type: String,
    pub params: Vec<Parameter>,
    /// Storage-class and linkage markers (`static`, `inline`, `__init`, ...).
    pub attributes: Vec<String>,
    pub location: Location,
    /// Span of the body; `None` for a declaration.
    pub body: Option<Location>,
    /// Type names mentioned inside the body, as written (`struct foo`, `foo_t`).
    pub type_refs: Vec<String>,
}

impl FunctionFact {
    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }
}

/// Struct or union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Struct,
    Union,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Struct => "struct",
            AggregateKind::Union => "union",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single member of a struct or union body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldFact {
    pub name: String,
    pub type_text: String,
    pub is_pointer: bool,
    pub is_function_pointer: bool,
    /// `ret (*)(params)` for function-pointer members.
    pub signature: Option<String>,
    pub array_len: Option<String>,
    pub bit_width: Option<String>,
}

/// A struct or union definition (one with a body).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFact {
    pub kind: AggregateKind,
    /// Tag name; `None` for anonymous aggregates.
    pub name: Option<String>,
    /// Name given by an enclosing `typedef`.
    pub typedef_alias: Option<String>,
    pub fields: Vec<FieldFact>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratorFact {
    pub name: String,
    /// Initializer expression text, if one was written.
    pub initializer: Option<String>,
}

/// An enum definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumFact {
    pub name: Option<String>,
    pub typedef_alias: Option<String>,
    pub members: Vec<EnumeratorFact>,
    pub location: Location,
}

/// `typedef <target> <alias>;`
#[derive(Debug, Clone, PartialEq)]
pub struct TypedefFact {
    pub alias: String,
    pub target: String,
    pub location: Location,
}

/// A call expression inside a function body.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Enclosing function.
    pub caller: String,
    /// Called identifier, or the member name for `obj->member(...)`.
    pub callee: String,
    /// Receiver expression text for member calls.
    pub receiver: Option<String>,
    pub location: Location,
}

impl CallSite {
    pub fn is_member_call(&self) -> bool {
        self.receiver.is_some()
    }
}

/// `.field = value` inside a `struct T var = { ... }` initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssignment {
    pub aggregate_type: String,
    pub variable: String,
    pub field: String,
    pub value: String,
    pub location: Location,
}

/// `target = value;` or `recv->target = value;` where value is an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerAssignment {
    /// Enclosing function, `None` at file scope.
    pub scope: Option<String>,
    pub target: String,
    pub receiver: Option<String>,
    pub value: String,
    pub location: Location,
}

/// Asynchronous execution mechanisms the kernel offers drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncMechanism {
    Work,
    DelayedWork,
    Tasklet,
    Timer,
    Hrtimer,
    Irq,
    ThreadedIrq,
    Kthread,
}

impl AsyncMechanism {
    /// Identifier used as the knowledge-base key.
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncMechanism::Work => "work",
            AsyncMechanism::DelayedWork => "delayed_work",
            AsyncMechanism::Tasklet => "tasklet",
            AsyncMechanism::Timer => "timer",
            AsyncMechanism::Hrtimer => "hrtimer",
            AsyncMechanism::Irq => "irq",
            AsyncMechanism::ThreadedIrq => "threaded_irq",
            AsyncMechanism::Kthread => "kthread",
        }
    }

    /// Kernel API that makes the handler run.
    pub fn trigger(&self) -> &'static str {
        match self {
            AsyncMechanism::Work => "schedule_work() / queue_work()",
            AsyncMechanism::DelayedWork => "schedule_delayed_work() / queue_delayed_work()",
            AsyncMechanism::Tasklet => "tasklet_schedule()",
            AsyncMechanism::Timer => "mod_timer() / add_timer()",
            AsyncMechanism::Hrtimer => "hrtimer_start()",
            AsyncMechanism::Irq => "hardware interrupt",
            AsyncMechanism::ThreadedIrq => "IRQ_WAKE_THREAD from the primary handler",
            AsyncMechanism::Kthread => "wake_up_process()",
        }
    }
}

impl fmt::Display for AsyncMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Registration APIs: (api name, mechanism, handler argument index).
///
/// An API may register more than one handler (`request_threaded_irq` takes a
/// primary handler and a thread function).
pub const ASYNC_REGISTRATIONS: &[(&str, AsyncMechanism, usize)] = &[
    ("INIT_WORK", AsyncMechanism::Work, 1),
    ("DECLARE_WORK", AsyncMechanism::Work, 1),
    ("INIT_DELAYED_WORK", AsyncMechanism::DelayedWork, 1),
    ("DECLARE_DELAYED_WORK", AsyncMechanism::DelayedWork, 1),
    ("tasklet_init", AsyncMechanism::Tasklet, 1),
    ("tasklet_setup", AsyncMechanism::Tasklet, 1),
    ("DECLARE_TASKLET", AsyncMechanism::Tasklet, 1),
    ("timer_setup", AsyncMechanism::Timer, 1),
    ("setup_timer", AsyncMechanism::Timer, 1),
    ("DEFINE_TIMER", AsyncMechanism::Timer, 1),
    ("request_irq", AsyncMechanism::Irq, 1),
    ("devm_request_irq", AsyncMechanism::Irq, 2),
    ("request_threaded_irq", AsyncMechanism::Irq, 1),
    ("request_threaded_irq", AsyncMechanism::ThreadedIrq, 2),
    ("devm_request_threaded_irq", AsyncMechanism::Irq, 2),
    ("devm_request_threaded_irq", AsyncMechanism::ThreadedIrq, 3),
    ("kthread_run", AsyncMechanism::Kthread, 0),
    ("kthread_create", AsyncMechanism::Kthread, 0),
];

/// Member name whose assignment installs an hrtimer callback.
pub const HRTIMER_FUNCTION_FIELD: &str = "function";

/// Registrations made by calling `api` with `args`. Arguments that are not a
/// plain identifier (after stripping `&`) or that are `NULL` are skipped.
pub fn registrations_for<'a>(
    api: &str,
    args: &'a [String],
) -> impl Iterator<Item = (AsyncMechanism, &'a str)> + 'a {
    let api = api.to_string();
    ASYNC_REGISTRATIONS
        .iter()
        .filter(move |(name, _, _)| *name == api)
        .filter_map(move |(_, mechanism, index)| {
            let arg = args.get(*index)?;
            handler_name(arg).map(|handler| (*mechanism, handler))
        })
}

/// Plain function name behind an argument expression, if there is one.
pub fn handler_name(arg: &str) -> Option<&str> {
    let trimmed = arg.trim().trim_start_matches('&').trim();
    let is_ident = !trimmed.is_empty()
        && trimmed.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_ident || trimmed == "NULL" {
        return None;
    }
    Some(trimmed)
}

/// A registration of an async handler.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRegistration {
    pub mechanism: AsyncMechanism,
    /// API that performed the registration (`INIT_WORK`, `.function`, ...).
    pub api: String,
    pub handler: String,
    pub scope: Option<String>,
    pub location: Location,
}

/// Which module lifecycle macro registered a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleHook {
    Init,
    Exit,
}

impl ModuleHook {
    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "module_init" => Some(ModuleHook::Init),
            "module_exit" => Some(ModuleHook::Exit),
            _ => None,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            ModuleHook::Init => "init",
            ModuleHook::Exit => "exit",
        }
    }
}

/// `module_init(fn)` / `module_exit(fn)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    pub hook: ModuleHook,
    pub function: String,
    pub location: Location,
}

/// `#define NAME ...`
#[derive(Debug, Clone, PartialEq)]
pub struct MacroFact {
    pub name: String,
    pub location: Location,
}

/// A file-scope variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableFact {
    pub name: String,
    pub type_text: String,
    pub location: Location,
}

/// Everything a backend extracted from one source text.
#[derive(Debug, Clone, Default)]
pub struct RawFacts {
    pub functions: Vec<FunctionFact>,
    pub aggregates: Vec<AggregateFact>,
    pub enums: Vec<EnumFact>,
    pub typedefs: Vec<TypedefFact>,
    pub calls: Vec<CallSite>,
    pub field_assignments: Vec<FieldAssignment>,
    pub pointer_assignments: Vec<PointerAssignment>,
    pub async_registrations: Vec<AsyncRegistration>,
    pub module_entries: Vec<ModuleEntry>,
    pub macros: Vec<MacroFact>,
    pub variables: Vec<VariableFact>,
    pub warnings: Vec<Warning>,
}

impl RawFacts {
    /// True when nothing declaration-level was recovered.
    pub fn has_no_declarations(&self) -> bool {
        self.functions.is_empty()
            && self.aggregates.is_empty()
            && self.enums.is_empty()
            && self.typedefs.is_empty()
            && self.variables.is_empty()
            && self.macros.is_empty()
            && self.module_entries.is_empty()
    }

    /// Append facts from another file.
    pub fn extend(&mut self, other: RawFacts) {
        self.functions.extend(other.functions);
        self.aggregates.extend(other.aggregates);
        self.enums.extend(other.enums);
        self.typedefs.extend(other.typedefs);
        self.calls.extend(other.calls);
        self.field_assignments.extend(other.field_assignments);
        self.pointer_assignments.extend(other.pointer_assignments);
        self.async_registrations.extend(other.async_registrations);
        self.module_entries.extend(other.module_entries);
        self.macros.extend(other.macros);
        self.variables.extend(other.variables);
        self.warnings.extend(other.warnings);
    }
}

/// Identifiers that look like calls but are language keywords or
/// transparent kernel helper macros.
pub const NON_CALL_IDENTIFIERS: &[&str] = &[
    "if",
    "for",
    "while",
    "switch",
    "return",
    "sizeof",
    "typeof",
    "__typeof__",
    "alignof",
    "_Alignof",
    "__alignof__",
    "do",
    "else",
    "case",
    "goto",
    "defined",
    "__attribute__",
    "asm",
    "__asm__",
    "__builtin_expect",
    "likely",
    "unlikely",
    "offsetof",
    "container_of",
];

pub fn is_non_call(name: &str) -> bool {
    NON_CALL_IDENTIFIERS.contains(&name)
}

/// Storage-class and linkage markers recorded as function attributes.
pub const FUNCTION_ATTRIBUTES: &[&str] = &[
    "static",
    "extern",
    "inline",
    "__inline",
    "__inline__",
    "__always_inline",
    "noinline",
    "__init",
    "__exit",
    "__cold",
    "__maybe_unused",
    "__must_check",
    "notrace",
];

/// Attribute markers written before a function name, in source order.
pub fn header_attributes(prefix: &str) -> Vec<String> {
    let mut attrs: Vec<String> = Vec::new();
    for token in prefix.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if FUNCTION_ATTRIBUTES.contains(&token) && !attrs.iter().any(|a| a == token) {
            attrs.push(token.to_string());
        }
    }
    attrs
}
