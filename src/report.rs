//! Output formatting for analysis results.
//!
//! Two formats:
//! - Pretty: colored terminal summary for humans
//! - JSON: the full serialized [`AnalysisResult`]

use std::io::{self, Write};

use colored::*;

use crate::analysis::{AnalysisResult, FileFailure};
use crate::backend::Backend;
use crate::error::{Warning, WarningKind};

const TOOL_NAME: &str = "driverscope";

// =============================================================================
// JSON Format
// =============================================================================

pub fn write_json<W: Write>(out: &mut W, result: &AnalysisResult) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

pub fn write_pretty<W: Write>(
    out: &mut W,
    result: &AnalysisResult,
    failures: &[FileFailure],
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "  {} v{}", TOOL_NAME.cyan().bold(), env!("CARGO_PKG_VERSION"))?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Analyzed: ".dimmed(), result.file())?;
    writeln!(
        out,
        "  {}{} {}  {}",
        "Backend:  ".dimmed(),
        result.backend_used(),
        result.backend_version().dimmed(),
        format!("({:.1} ms)", result.analysis_time().as_secs_f64() * 1000.0).dimmed()
    )?;
    writeln!(out)?;

    write_counts(out, result)?;
    writeln!(out)?;

    let summary = result.summary();
    if !summary.callback_groups.is_empty() {
        writeln!(out, "  {} ({}):", "Callbacks".bold(), summary.callbacks)?;
        for (group, names) in &summary.callback_groups {
            writeln!(out, "    {:<24} {}", group.blue(), names.join(", "))?;
        }
        writeln!(out)?;
    }

    if !result.async_handlers().is_empty() {
        writeln!(out, "  {} ({}):", "Async handlers".bold(), result.async_handlers().len())?;
        for handler in result.async_handlers() {
            writeln!(
                out,
                "    {:<28} {:<14} {} {}",
                handler.handler,
                handler.mechanism.as_str().dimmed(),
                handler.context,
                format!("via {}", handler.api).dimmed()
            )?;
        }
        writeln!(out)?;
    }

    if !result.entry_points().is_empty() {
        writeln!(out, "  {}:", "Entry points".bold())?;
        for name in result.entry_points() {
            let context = result
                .function(name)
                .and_then(|f| f.callback_context.as_deref())
                .unwrap_or_default();
            writeln!(out, "    {:<28} {}", name.green(), context.dimmed())?;
        }
        writeln!(out)?;
    }

    if !result.warnings().is_empty() {
        writeln!(out, "  {} ({}):", "Warnings".bold(), result.warnings().len())?;
        writeln!(out)?;
        for warning in result.warnings() {
            write_warning(out, warning)?;
        }
        writeln!(out)?;
    }

    if !failures.is_empty() {
        writeln!(out, "  {} ({}):", "Skipped files".bold(), failures.len())?;
        for failure in failures {
            writeln!(out, "    {} {}", "ERROR".red(), failure.path.display().to_string().blue())?;
            writeln!(out, "            {}", failure.error)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_counts<W: Write>(out: &mut W, result: &AnalysisResult) -> io::Result<()> {
    let summary = result.summary();
    let rows = [
        ("functions", summary.functions),
        ("declarations", summary.declarations),
        ("structs", summary.structs),
        ("unions", summary.unions),
        ("enums", summary.enums),
        ("typedefs", result.typedefs().len()),
        ("call edges", summary.call_edges),
    ];
    for (label, count) in rows {
        writeln!(out, "    {:<14} {:>5}", label, count)?;
    }
    Ok(())
}

fn write_warning<W: Write>(out: &mut W, warning: &Warning) -> io::Result<()> {
    let tag = match warning.kind {
        WarningKind::UnparsableRegion | WarningKind::Redefinition => "WARN ".yellow(),
        WarningKind::AmbiguousCallback | WarningKind::UnresolvedCall => "INFO ".blue(),
        WarningKind::UnsupportedConstruct | WarningKind::UnknownMechanism => "NOTE ".dimmed(),
    };
    write!(out, "    {}  {:<22}", tag, warning.kind.as_str().dimmed())?;
    if let Some(location) = &warning.location {
        write!(out, "{}", location.file.blue())?;
        write!(out, "{}", format!(":{}", location.start_line).dimmed())?;
    }
    writeln!(out)?;
    writeln!(out, "            {}", warning.message)
}

/// The `backends` listing.
pub fn write_backends<W: Write>(out: &mut W, backends: &[&dyn Backend]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "  {}", "Backends".bold())?;
    writeln!(out)?;
    for backend in backends {
        let status = if backend.is_available() {
            "available  ".green()
        } else {
            "unavailable".red()
        };
        writeln!(
            out,
            "    {:<14} {:<8} {}",
            backend.name().cyan(),
            backend.version(),
            status
        )?;
        writeln!(out, "            {}", backend.capabilities().to_string().dimmed())?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analysis::Analyzer;
    use crate::backend::HeuristicBackend;
    use crate::knowledge::KnowledgeBase;

    fn sample() -> AnalysisResult {
        let analyzer =
            Analyzer::new(Arc::new(HeuristicBackend::new()), Arc::new(KnowledgeBase::builtin()));
        analyzer
            .analyze_source(
                "static int my_open(struct inode *i, struct file *f)\n{\n    return 0;\n}\n\
                 static const struct file_operations fops = {\n    .open = my_open,\n};\n",
                "chr.c",
            )
            .unwrap()
    }

    #[test]
    fn test_json_output_parses() {
        let mut buf = Vec::new();
        write_json(&mut buf, &sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["file"], "chr.c");
        assert_eq!(value["functions"]["my_open"]["is_callback"], true);
    }

    #[test]
    fn test_pretty_output_mentions_callbacks() {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        write_pretty(&mut buf, &sample(), &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Analyzed: chr.c"));
        assert!(text.contains("file_operations"));
        assert!(text.contains("my_open"));
    }

    #[test]
    fn test_backends_listing() {
        colored::control::set_override(false);
        let heuristic = HeuristicBackend::new();
        let mut buf = Vec::new();
        write_backends(&mut buf, &[&heuristic]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("heuristic"));
        assert!(text.contains("available"));
        assert!(text.contains("parse_functions"));
    }
}
