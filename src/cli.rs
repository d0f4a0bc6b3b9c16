//! Command-line interface for driverscope.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use crate::analysis::{AnalysisResult, Analyzer, FileFailure};
use crate::backend::{selector, Backend};
use crate::config::{AnalyzerConfig, DEFAULT_CONFIG_NAMES};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_WARNINGS: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Static semantic analysis of C kernel-driver sources.
///
/// Extracts functions, types, call graphs, framework callbacks and
/// asynchronous handlers from driver code without compiling it.
#[derive(Parser)]
#[command(name = "driverscope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a source file or a directory of sources
    Analyze(AnalyzeArgs),
    /// List parsing backends and their capabilities
    Backends,
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// File or directory to analyze
    pub path: PathBuf,

    /// Backend name (default: best available)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Knowledge-base file (JSON or YAML), layered over the built-in one
    #[arg(short, long)]
    pub knowledge: Option<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Report calls to functions not defined in the analyzed sources
    #[arg(long)]
    pub cross_file: bool,

    /// Exit non-zero when the analysis produced warnings
    #[arg(long)]
    pub strict: bool,
}

fn load_config(args: &AnalyzeArgs) -> anyhow::Result<AnalyzerConfig> {
    let discovered = match &args.config {
        Some(path) => Some(path.clone()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| AnalyzerConfig::discover(&cwd)),
    };
    let mut config = match discovered {
        Some(path) => AnalyzerConfig::parse_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            tracing::debug!(
                "no config file found (looked for {})",
                DEFAULT_CONFIG_NAMES.join(", ")
            );
            AnalyzerConfig::default()
        }
    };

    if args.backend.is_some() {
        config.backend = args.backend.clone();
    }
    if args.knowledge.is_some() {
        config.knowledge_base = args.knowledge.clone();
    }
    if args.cross_file {
        config.cross_file = true;
    }
    Ok(config)
}

/// Source files under `root`, sorted, honoring the configured extensions
/// and exclusions. Hidden directories are skipped.
fn collect_files(root: &Path, config: &AnalyzerConfig) -> anyhow::Result<Vec<PathBuf>> {
    let filter = config.path_filter();
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.depth() > 0 && e.file_type().is_dir() && name.starts_with('.'))
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if filter.accepts(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let format = args.format.to_ascii_lowercase();
    if format != "pretty" && format != "json" {
        anyhow::bail!("unknown output format '{}' (expected pretty or json)", args.format);
    }

    let config = load_config(args)?;
    let analyzer = Analyzer::from_config(&config).context("failed to set up the analyzer")?;

    let (result, failures) = if args.path.is_dir() {
        let files = collect_files(&args.path, &config)?;
        if files.is_empty() {
            anyhow::bail!("no source files found under {}", args.path.display());
        }
        let outcome = analyzer.analyze_batch(&args.path.to_string_lossy(), &files);
        (outcome.result, outcome.failures)
    } else {
        let result = analyzer
            .analyze_file(&args.path)
            .with_context(|| format!("failed to analyze {}", args.path.display()))?;
        (result, Vec::new())
    };

    match &args.output {
        Some(path) => {
            colored::control::set_override(false);
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_result(&mut out, &format, &result, &failures)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            write_result(&mut stdout.lock(), &format, &result, &failures)?;
        }
    }

    let degraded = !result.warnings().is_empty() || !failures.is_empty();
    if args.strict && degraded {
        Ok(EXIT_WARNINGS)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

fn write_result<W: Write>(
    out: &mut W,
    format: &str,
    result: &AnalysisResult,
    failures: &[FileFailure],
) -> anyhow::Result<()> {
    if format == "json" {
        report::write_json(out, result)
    } else {
        report::write_pretty(out, result, failures)?;
        Ok(())
    }
}

/// Run the backends command.
pub fn run_backends() -> anyhow::Result<i32> {
    let candidates: Vec<&dyn Backend> = selector::global()
        .candidates()
        .iter()
        .map(|b| b.as_ref())
        .collect();
    let stdout = io::stdout();
    report::write_backends(&mut stdout.lock(), &candidates)?;
    Ok(EXIT_SUCCESS)
}
