//! Batch analysis over many files.
//!
//! Files are parsed in parallel, their facts merged in path order, and
//! the merged facts run once through the builder, call graph and
//! resolver so that names resolve across files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use super::{AnalysisResult, Analyzer};
use crate::backend::RawFacts;
use crate::error::{AnalysisError, Result};

/// A file that could not be read or parsed.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: AnalysisError,
}

/// Combined result of a batch plus the files that were left out of it.
#[derive(Debug)]
pub struct BatchOutcome {
    pub result: AnalysisResult,
    pub failures: Vec<FileFailure>,
}

impl Analyzer {
    /// Analyze `paths` as one unit labelled `label`. Cross-file
    /// resolution is always on. Individual failures do not abort the
    /// batch.
    pub fn analyze_batch(&self, label: &str, paths: &[PathBuf]) -> BatchOutcome {
        let started = Instant::now();
        let mut paths = paths.to_vec();
        paths.sort();
        paths.dedup();

        let parsed: Vec<(PathBuf, Result<RawFacts>)> = paths
            .par_iter()
            .map(|path| (path.clone(), self.parse_path(path)))
            .collect();

        let mut merged = RawFacts::default();
        let mut failures = Vec::new();
        for (path, outcome) in parsed {
            match outcome {
                Ok(facts) => merged.extend(facts),
                Err(error) => {
                    warn!(path = %path.display(), "skipping file: {}", error);
                    failures.push(FileFailure { path, error });
                }
            }
        }

        let options = self.options().cross_file(true);
        let result = self.finish(label.to_string(), &merged, options, started);
        info!(
            files = paths.len(),
            failed = failures.len(),
            backend = result.backend_used(),
            elapsed_ms = result.analysis_time().as_millis() as u64,
            "batch analysis finished"
        );
        BatchOutcome { result, failures }
    }

    fn parse_path(&self, path: &Path) -> Result<RawFacts> {
        let source = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.backend().parse(&source, &path.to_string_lossy())
    }
}
