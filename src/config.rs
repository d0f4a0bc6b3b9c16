//! Analyzer configuration.
//!
//! A YAML document, discovered in the working directory or the user's
//! config directory. Command-line flags override what it says.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::knowledge::KnowledgeBase;

/// File names searched in the working directory, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["driverscope.yaml", ".driverscope.yaml"];

/// File name inside the user config directory.
const USER_CONFIG_NAME: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Backend name; the selector's default when absent.
    pub backend: Option<String>,
    /// Knowledge-base document (JSON or YAML).
    pub knowledge_base: Option<PathBuf>,
    /// Layer the built-in knowledge base under `knowledge_base`.
    pub builtin_knowledge: bool,
    /// Report calls to functions defined nowhere in the analyzed sources.
    pub cross_file: bool,
    /// Source extensions picked up when walking a directory.
    pub extensions: Vec<String>,
    /// Glob patterns for paths to skip (e.g. `"**/staging/**"`).
    pub excluded_paths: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backend: None,
            knowledge_base: None,
            builtin_knowledge: true,
            cross_file: false,
            extensions: vec!["c".to_string(), "h".to_string()],
            excluded_paths: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: AnalyzerConfig =
            serde_yaml::from_str(content).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| match e {
            AnalysisError::Config(reason) => {
                AnalysisError::Config(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// First config file found in `dir`, then in the user config directory.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        for name in DEFAULT_CONFIG_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                return Some(path);
            }
        }
        let user = ProjectDirs::from("dev", "zen-systems", "driverscope")?
            .config_dir()
            .join(USER_CONFIG_NAME);
        user.is_file().then_some(user)
    }

    fn validate(&self) -> Result<()> {
        for pattern in &self.excluded_paths {
            Glob::new(pattern).map_err(|e| {
                AnalysisError::Config(format!("invalid excluded_paths pattern {:?}: {}", pattern, e))
            })?;
        }
        if self.extensions.iter().any(|e| e.trim().is_empty()) {
            return Err(AnalysisError::Config("empty entry in extensions".to_string()));
        }
        Ok(())
    }

    /// The configured knowledge base, with the built-in tables underneath
    /// unless disabled.
    pub fn load_knowledge(&self) -> Result<KnowledgeBase> {
        let builtin = || {
            if self.builtin_knowledge {
                KnowledgeBase::builtin()
            } else {
                KnowledgeBase::empty()
            }
        };
        match &self.knowledge_base {
            Some(path) => Ok(KnowledgeBase::from_path(path)?.merged_over(&builtin())),
            None => Ok(builtin()),
        }
    }

    /// Matcher for the extensions and exclusions, with the globs compiled
    /// once. Build it before walking a tree and reuse it for every entry.
    pub fn path_filter(&self) -> PathFilter<'_> {
        let exclusions = if self.excluded_paths.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.excluded_paths {
                if let Ok(glob) = Glob::new(pattern) {
                    builder.add(glob);
                }
            }
            builder.build().ok()
        };
        PathFilter {
            extensions: &self.extensions,
            exclusions,
        }
    }

    pub fn has_source_extension(&self, path: &Path) -> bool {
        matches_extension(&self.extensions, path)
    }
}

fn matches_extension(extensions: &[String], path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Compiled form of a config's path rules.
#[derive(Debug, Clone)]
pub struct PathFilter<'a> {
    extensions: &'a [String],
    exclusions: Option<GlobSet>,
}

impl PathFilter<'_> {
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclusions
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }

    /// A source file by extension that no exclusion pattern matches.
    pub fn accepts(&self, path: &Path) -> bool {
        matches_extension(self.extensions, path) && !self.is_excluded(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::parse("{}").unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert!(config.builtin_knowledge);
        assert!(config.has_source_extension(Path::new("drivers/usb/core.c")));
        assert!(config.has_source_extension(Path::new("include/dev.H")));
        assert!(!config.has_source_extension(Path::new("Makefile")));
    }

    #[test]
    fn test_parse_full() {
        let config = AnalyzerConfig::parse(
            r#"
backend: heuristic
knowledge_base: kb/kernel.json
builtin_knowledge: false
cross_file: true
extensions: [c]
excluded_paths:
  - "**/staging/**"
"#,
        )
        .unwrap();
        assert_eq!(config.backend.as_deref(), Some("heuristic"));
        assert!(config.cross_file);
        let filter = config.path_filter();
        assert!(filter.is_excluded(Path::new("drivers/staging/foo/bar.c")));
        assert!(!filter.is_excluded(Path::new("drivers/usb/bar.c")));
        assert!(filter.accepts(Path::new("drivers/usb/bar.c")));
        assert!(!filter.accepts(Path::new("drivers/staging/foo/bar.c")));
        assert!(!config.has_source_extension(Path::new("dev.h")));
        assert!(!filter.accepts(Path::new("drivers/usb/dev.h")));
    }

    #[test]
    fn test_path_filter_without_exclusions() {
        let config = AnalyzerConfig::default();
        let filter = config.path_filter();
        assert!(!filter.is_excluded(Path::new("drivers/staging/x.c")));
        assert!(filter.accepts(Path::new("drivers/staging/x.c")));
        assert!(!filter.accepts(Path::new("drivers/staging/Kconfig")));
    }

    #[test]
    fn test_invalid_glob() {
        let err = AnalyzerConfig::parse("excluded_paths: ['a[']").unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn test_discover_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".driverscope.yaml"), "cross_file: true\n").unwrap();
        let found = AnalyzerConfig::discover(dir.path()).unwrap();
        assert!(found.ends_with(".driverscope.yaml"));
        assert!(AnalyzerConfig::parse_file(&found).unwrap().cross_file);
    }

    #[test]
    fn test_knowledge_without_builtin() {
        let config = AnalyzerConfig {
            builtin_knowledge: false,
            ..AnalyzerConfig::default()
        };
        assert!(config.load_knowledge().unwrap().is_empty());
        assert!(!AnalyzerConfig::default().load_knowledge().unwrap().is_empty());
    }
}
