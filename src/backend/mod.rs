//! Parsing backends.
//!
//! A backend turns one C source text into [`RawFacts`]. Two backends ship
//! with the crate:
//!
//! ```text
//! ┌──────────────┐   priority 1   ┌──────────────────┐
//! │              │───────────────▶│ SyntaxTreeBackend│  tree-sitter-c
//! │   Selector   │                └──────────────────┘
//! │ (cached      │   priority 2   ┌──────────────────┐
//! │  default)    │───────────────▶│ HeuristicBackend │  pattern scanning
//! └──────────────┘                └──────────────────┘
//!                                          │
//!                                          ▼
//!                                   RawFacts (unmerged)
//! ```
//!
//! Backends are stateless and shared through `Arc<dyn Backend>`.

pub mod facts;
pub mod heuristic;
pub mod selector;
pub mod source;
pub mod syntax_tree;
#[cfg(feature = "tree-sitter")]
mod treesitter;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use once_cell::sync::Lazy;

pub use facts::{
    AggregateFact, AggregateKind, AsyncMechanism, AsyncRegistration, CallSite, EnumFact,
    EnumeratorFact, FieldAssignment, FieldFact, FunctionFact, Location, MacroFact, ModuleEntry,
    ModuleHook, Parameter, PointerAssignment, RawFacts, TypedefFact, VariableFact,
};
pub use heuristic::HeuristicBackend;
pub use selector::{BackendSelector, SelectorState};
pub use syntax_tree::SyntaxTreeBackend;

use crate::error::Result;

bitflags! {
    /// What a backend can extract, or what an analysis pass asks for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        const PARSE_FUNCTIONS = 1 << 0;
        const PARSE_AGGREGATES = 1 << 1;
        const PARSE_ENUMS = 1 << 2;
        const PARSE_CALLS = 1 << 3;
        const PARSE_TYPEDEFS = 1 << 4;
        const TYPE_INFERENCE = 1 << 5;
        const MACRO_EXPANSION = 1 << 6;
        const CROSS_FILE = 1 << 7;
        const INCREMENTAL = 1 << 8;
        const PRECISE_LOCATIONS = 1 << 9;
    }
}

impl Capabilities {
    /// Lowercase flag names, in bit order.
    pub fn names(&self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_lowercase()).collect()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

/// A parsing backend.
///
/// Implementations must be stateless: `parse` may be called concurrently
/// from several threads and must not mutate global state.
pub trait Backend: Send + Sync {
    /// Stable identifier (`"tree-sitter"`, `"heuristic"`).
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Whether the backend's runtime requirements are met. Never panics and
    /// has no side effects.
    fn is_available(&self) -> bool;

    fn capabilities(&self) -> Capabilities;

    /// Extract raw facts from `source`. `filename` is only a label for
    /// locations and messages.
    ///
    /// Malformed input yields partial facts plus warnings; an error is
    /// returned only when nothing could be recovered.
    fn parse(&self, source: &str, filename: &str) -> Result<RawFacts>;

    fn supports(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }
}

/// The closed set of shipped backends, in default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    SyntaxTree,
    Heuristic,
}

static SYNTAX_TREE: Lazy<Arc<dyn Backend>> = Lazy::new(|| Arc::new(SyntaxTreeBackend::new()));
static HEURISTIC: Lazy<Arc<dyn Backend>> = Lazy::new(|| Arc::new(HeuristicBackend::new()));

impl BackendKind {
    pub const PRIORITY: [BackendKind; 2] = [BackendKind::SyntaxTree, BackendKind::Heuristic];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::SyntaxTree => syntax_tree::NAME,
            BackendKind::Heuristic => heuristic::NAME,
        }
    }

    /// Accepts the canonical names plus a few aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tree-sitter" | "treesitter" | "tree_sitter" | "syntax-tree" | "syntax_tree" => {
                Some(BackendKind::SyntaxTree)
            }
            "heuristic" | "regex" | "pattern" => Some(BackendKind::Heuristic),
            _ => None,
        }
    }

    /// Shared instance of this backend.
    pub fn instance(&self) -> Arc<dyn Backend> {
        match self {
            BackendKind::SyntaxTree => Arc::clone(&SYNTAX_TREE),
            BackendKind::Heuristic => Arc::clone(&HEURISTIC),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Names of available backends, in priority order.
pub fn list_backends() -> Vec<&'static str> {
    selector::global().available()
}

/// Backend by name, or the cached default when `name` is `None`.
pub fn get_backend(name: Option<&str>) -> Result<Arc<dyn Backend>> {
    selector::global().select(name)
}
