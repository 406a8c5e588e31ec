mod oxc;
mod registry;

pub use oxc::OxcTransform;
pub use registry::TransformRegistry;

use crate::options::minify_flags_from;
use crate::sourcemap::SourceMap;
use crate::types::{Dialect, LegalComments, Location, MinifyFlags, SourceMapMode, Target, Warning};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Options handed to the transform capability for one invocation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    pub target: Target,
    pub dialect: Dialect,
    pub source_map: SourceMapMode,
    /// Path or asset name reported in diagnostics and source maps
    pub source_file: String,
    pub minify: MinifyFlags,
    pub legal_comments: LegalComments,
    /// Keep `import()` expressions intact so the host can split chunks on them
    pub dynamic_import: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsconfig_raw: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransformOptions {
    pub fn with_dialect(&self, dialect: Dialect) -> Self {
        Self { dialect, ..self.clone() }
    }

    /// Lift the recognized keys out of a free-form option map; the rest
    /// is forwarded untouched in `extra`
    pub fn from_extra(mut extra: Map<String, Value>) -> Result<Self, TransformError> {
        let minify = minify_flags_from(&extra);
        for key in ["minify", "minifyWhitespace", "minifyIdentifiers", "minifySyntax"] {
            extra.remove(key);
        }

        let legal_comments = match extra.remove("legalComments") {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| TransformError::new(format!("Invalid `legalComments` option: {e}")))?,
            None => LegalComments::default(),
        };

        let tsconfig_raw = match extra.remove("tsconfigRaw") {
            Some(Value::String(raw)) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| TransformError::new(format!("Invalid `tsconfigRaw` option: {e}")))?,
            ),
            other => other,
        };

        Ok(Self { minify, legal_comments, tsconfig_raw, extra, ..Default::default() })
    }

    /// `compilerOptions.<key>` from the forwarded tsconfig, if any
    pub fn compiler_option(&self, key: &str) -> Option<&Value> {
        self.tsconfig_raw.as_ref()?.get("compilerOptions")?.get(key)
    }
}

/// Output of one transform invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformResult {
    pub code: String,
    pub map: Option<SourceMap>,
    pub warnings: Vec<Warning>,
    pub legal_comments: Option<String>,
}

/// Structured failure reported by the transform capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    pub message: String,
    pub location: Option<Location>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), location: None }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransformError {}

/// The source-to-source compiler this crate wraps.
///
/// Implementations must be safe to call concurrently; the minify pass runs
/// one invocation per asset at the same time.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Registry name (e.g., "oxc")
    fn name(&self) -> &str;

    /// Bring up any backing service. Called once per process by the lifecycle.
    async fn start(&self) -> Result<(), TransformError> {
        Ok(())
    }

    /// Release the backing service after a non-watch build
    async fn stop(&self) {}

    async fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> Result<TransformResult, TransformError>;
}
