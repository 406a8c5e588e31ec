use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::host::HostError;
use crate::sourcemap::SourceMapError;
use crate::transform::TransformError;
use crate::tsconfig::ConfigError;

/// Compile-down target used when none is configured
pub const DEFAULT_TARGET: &str = "es2015";

/// Source grammar a file is parsed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Js,
    Jsx,
    Ts,
    Tsx,
    Css,
    Json,
    /// Most permissive applicable grammar (typed with embedded markup)
    #[default]
    Default,
}

impl Dialect {
    /// Infer the dialect from a file extension. Query strings are ignored.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        let name = strip_query(&name);
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();

        match ext.as_str() {
            "js" | "mjs" | "cjs" => Some(Self::Js),
            "jsx" => Some(Self::Jsx),
            "ts" | "mts" | "cts" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            "css" => Some(Self::Css),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Whether this dialect is parsed with the typed JSX-capable superset grammar
    pub fn is_superset(self) -> bool {
        matches!(self, Self::Tsx | Self::Default)
    }

    /// The stricter non-JSX variant tried when the superset grammar rejects a token
    pub fn strict_variant(self) -> Option<Self> {
        self.is_superset().then_some(Self::Ts)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
            Self::Css => "css",
            Self::Json => "json",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip a trailing `?query` or `#hash` from an asset or resource name
pub fn strip_query(name: &str) -> &str {
    match name.find(['?', '#']) {
        Some(index) => &name[..index],
        None => name,
    }
}

/// Compile-down target: a single environment or a list of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(Vec<String>);

impl Target {
    pub fn new(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(targets.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for Target {
    fn default() -> Self {
        Self(vec![DEFAULT_TARGET.to_string()])
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            many => many.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(target) => Self(target.split(',').map(|t| t.trim().to_string()).collect()),
            Repr::Many(targets) => Self(targets),
        })
    }
}

/// How a source map is produced for a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    #[default]
    None,
    Inline,
    External,
}

impl SourceMapMode {
    pub fn is_enabled(self) -> bool {
        self != Self::None
    }
}

impl<'de> Deserialize<'de> for SourceMapMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Mode(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(Self::External),
            Repr::Flag(false) => Ok(Self::None),
            Repr::Mode(mode) => match mode.as_str() {
                "none" => Ok(Self::None),
                "inline" => Ok(Self::Inline),
                "external" | "linked" => Ok(Self::External),
                other => Err(serde::de::Error::custom(format!("unknown sourcemap mode `{other}`"))),
            },
        }
    }
}

/// Where extracted license comments end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LegalComments {
    #[default]
    Inline,
    Eof,
    None,
    External,
}

/// Which minification passes the transform runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinifyFlags {
    pub whitespace: bool,
    pub identifiers: bool,
    pub syntax: bool,
}

impl MinifyFlags {
    pub fn all() -> Self {
        Self { whitespace: true, identifiers: true, syntax: true }
    }

    pub fn any(&self) -> bool {
        self.whitespace || self.identifiers || self.syntax
    }
}

/// Position in a source file, used for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_text: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Non-fatal message produced by a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Error types for rivet operations
#[derive(Error, Debug)]
pub enum RivetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Transform failed for {path}: {source}")]
    Transform {
        path: String,
        #[source]
        source: TransformError,
    },

    #[error("Unknown transform implementation `{name}` (available: {available})")]
    UnknownImplementation { name: String, available: String },

    #[error("Transform service failed to start: {0}")]
    ServiceStart(TransformError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    SourceMap(#[from] SourceMapError),

    #[error("Invalid filter pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
