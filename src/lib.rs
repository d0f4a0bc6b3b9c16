//! driverscope - static semantic analysis of C kernel-driver sources.
//!
//! Source text goes through a pluggable parsing backend into raw facts,
//! which are organized into a semantic model, linked into a call graph
//! and resolved against a knowledge base of kernel frameworks and async
//! mechanisms.
//!
//! # Architecture
//!
//! - `backend`: parsing backends (tree-sitter, heuristic) and the selector
//! - `analysis`: model builder, call graph, callback resolver, results
//! - `knowledge`: framework callback and async mechanism tables
//! - `config`: YAML configuration and discovery
//! - `report`: output formatting (pretty, JSON)
//!
//! ```no_run
//! use driverscope::Analyzer;
//!
//! let analyzer = Analyzer::with_default_backend()?;
//! let result = analyzer.analyze_file("drivers/usb/misc/mydev.c")?;
//! for name in result.entry_points() {
//!     println!("{}", name);
//! }
//! # Ok::<(), driverscope::AnalysisError>(())
//! ```

pub mod analysis;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod report;

pub use analysis::{AnalysisOptions, AnalysisResult, Analyzer, BatchOutcome};
pub use backend::{get_backend, list_backends, Backend, BackendKind, Capabilities, RawFacts};
pub use config::AnalyzerConfig;
pub use error::{AnalysisError, Result, Warning, WarningKind};
pub use knowledge::KnowledgeBase;
