//! Error and warning types.
//!
//! Fatal conditions abort an analysis pass and surface as [`AnalysisError`].
//! Degraded conditions never abort: they are collected as [`Warning`]s and
//! returned alongside the (partial) result.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::backend::Location;

/// Errors that abort an analysis pass.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("backend '{0}' is unavailable: its runtime dependencies are missing")]
    BackendUnavailable(String),

    #[error("unknown backend '{name}' (known backends: {known})")]
    UnknownBackend { name: String, known: String },

    #[error("no parsing backend is available")]
    NoBackendAvailable,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid knowledge base: {0}")]
    KnowledgeBase(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::Parse {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Kind of degraded condition recorded during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A construct the backend or builder does not model (unevaluable enum
    /// initializer, nested declarator form, ...).
    UnsupportedConstruct,
    /// An indirect call resolved to more than one candidate function.
    AmbiguousCallback,
    /// A second body-bearing definition of an already defined name.
    Redefinition,
    /// A span the parser could not make sense of.
    UnparsableRegion,
    /// An async mechanism absent from the knowledge base.
    UnknownMechanism,
    /// A call to a function not defined in the analyzed sources.
    UnresolvedCall,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::UnsupportedConstruct => "unsupported_construct",
            WarningKind::AmbiguousCallback => "ambiguous_callback",
            WarningKind::Redefinition => "redefinition",
            WarningKind::UnparsableRegion => "unparsable_region",
            WarningKind::UnknownMechanism => "unknown_mechanism",
            WarningKind::UnresolvedCall => "unresolved_call",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-fatal diagnostic attached to an analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}: [{}] {}", loc.file, loc.start_line, self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}
