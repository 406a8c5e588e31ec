//! Per-file TypeScript configuration discovery.

mod matcher;
mod resolver;

pub use matcher::{IncludeMatcher, Scope};
pub use resolver::ConfigResolver;

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in ancestor directories
pub const CONFIG_FILE_NAME: &str = "tsconfig.json";

/// Failure to load a configuration file. Cached alongside successful parses,
/// so it carries rendered messages instead of source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Tsconfig not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read tsconfig at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse tsconfig at {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Cannot resolve `extends` value \"{specifier}\" in {}", path.display())]
    Extends { path: PathBuf, specifier: String },

    #[error("Circular `extends` chain through {}", path.display())]
    CircularExtends { path: PathBuf },
}

/// Configuration in effect for one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveConfig {
    /// Configuration file it came from, `None` when nothing applies
    pub source_path: Option<PathBuf>,
    /// Merged configuration object with `extends` followed
    pub parsed_options: Map<String, Value>,
    /// Whether the file is inside the configuration's declared scope
    pub matches_include_patterns: bool,
}

impl EffectiveConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed_options.is_empty()
    }

    pub fn compiler_options(&self) -> Option<&Map<String, Value>> {
        self.parsed_options.get("compilerOptions")?.as_object()
    }
}

/// Result of resolving a file, with diagnostics that must not fail the build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub config: EffectiveConfig,
    pub warnings: Vec<String>,
}

/// Whether a path belongs to third-party code, judged by a `node_modules`
/// directory component rather than a substring of the path.
pub fn is_dependency_path(path: &Path) -> bool {
    path.components().any(|component| component.as_os_str() == "node_modules")
}
