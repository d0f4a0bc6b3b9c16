//! tree-sitter backend.
//!
//! Available only when the crate is built with the `tree-sitter` feature
//! (on by default). The walker itself lives in `treesitter.rs`.

use tracing::debug;

use super::facts::RawFacts;
use super::{Backend, Capabilities};
use crate::error::Result;

pub const NAME: &str = "tree-sitter";
pub const VERSION: &str = "0.2.0";

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxTreeBackend;

impl SyntaxTreeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for SyntaxTreeBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn version(&self) -> &'static str {
        VERSION
    }

    #[cfg(feature = "tree-sitter")]
    fn is_available(&self) -> bool {
        super::treesitter::language_loads()
    }

    #[cfg(not(feature = "tree-sitter"))]
    fn is_available(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PARSE_FUNCTIONS
            | Capabilities::PARSE_AGGREGATES
            | Capabilities::PARSE_ENUMS
            | Capabilities::PARSE_CALLS
            | Capabilities::PARSE_TYPEDEFS
            | Capabilities::PRECISE_LOCATIONS
    }

    #[cfg(feature = "tree-sitter")]
    fn parse(&self, source: &str, filename: &str) -> Result<RawFacts> {
        let facts = super::treesitter::parse(source, filename)?;
        debug!(
            file = filename,
            functions = facts.functions.len(),
            calls = facts.calls.len(),
            warnings = facts.warnings.len(),
            "syntax tree walk finished"
        );
        Ok(facts)
    }

    #[cfg(not(feature = "tree-sitter"))]
    fn parse(&self, _source: &str, filename: &str) -> Result<RawFacts> {
        debug!(file = filename, "tree-sitter support not compiled in");
        Err(crate::error::AnalysisError::BackendUnavailable(NAME.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tree-sitter")]
    #[test]
    fn test_available_with_feature() {
        let backend = SyntaxTreeBackend::new();
        assert!(backend.is_available());
        assert!(backend.is_available());
        assert!(backend.supports(Capabilities::PRECISE_LOCATIONS));
    }

    #[cfg(not(feature = "tree-sitter"))]
    #[test]
    fn test_unavailable_without_feature() {
        let backend = SyntaxTreeBackend::new();
        assert!(!backend.is_available());
        assert!(backend.parse("int x;", "a.c").is_err());
    }
}
