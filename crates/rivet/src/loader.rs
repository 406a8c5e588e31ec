//! Per-file transform adapter run by the host for every matching module.

use crate::options::{LoaderOptions, merge_layers};
use crate::sourcemap::SourceMap;
use crate::transform::{Transform, TransformError, TransformOptions, TransformResult};
use crate::tsconfig::{ConfigResolver, EffectiveConfig};
use crate::types::{Dialect, RivetError, SourceMapMode, Target};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Errors that suggest the input is valid in the stricter grammar only
fn dialect_mismatch_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        // e.g. `Unexpected token`, `Expected ">" but found "x"`, `JSX element ... has no closing tag`
        Regex::new(r#"(?i)unexpected|expected\b.*\bbut found|\bjsx\b|closing tag"#).unwrap()
    })
}

/// One file handed to the transform
#[derive(Debug, Clone, Default)]
pub struct TransformRequest {
    pub source_text: String,
    pub file_path: PathBuf,
    /// Explicit dialect; inferred from `file_path` when absent
    pub dialect: Option<Dialect>,
    pub target: Target,
    pub source_map: SourceMapMode,
    pub extra_options: Map<String, Value>,
}

impl TransformRequest {
    pub fn dialect(&self) -> Dialect {
        self.dialect.or_else(|| Dialect::from_path(&self.file_path)).unwrap_or_default()
    }
}

/// What the host passes along with each module
#[derive(Debug, Clone, Default)]
pub struct LoaderContext {
    pub resource_path: PathBuf,
    /// Whether the host wants source maps for this build
    pub source_map: bool,
}

/// Result handed back to the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderOutput {
    pub code: String,
    pub map: Option<SourceMap>,
    pub warnings: Vec<String>,
}

pub struct Loader {
    options: LoaderOptions,
    transform: Arc<dyn Transform>,
    resolver: Arc<ConfigResolver>,
    defaults: Map<String, Value>,
}

impl Loader {
    pub fn new(options: LoaderOptions, transform: Arc<dyn Transform>, resolver: Arc<ConfigResolver>) -> Self {
        Self { options, transform, resolver, defaults: Map::new() }
    }

    /// Options applied below configuration-derived and per-request options
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Transform one module's source
    pub async fn run(&self, source: &str, context: &LoaderContext) -> Result<LoaderOutput, RivetError> {
        let mut warnings = Vec::new();

        // An explicit raw config wins over discovery
        let config = if self.options.extra.contains_key("tsconfigRaw") {
            EffectiveConfig::empty()
        } else {
            let resolution =
                self.resolver.resolve(&context.resource_path, self.options.tsconfig.as_deref())?;
            warnings.extend(resolution.warnings);
            resolution.config
        };

        let source_map = self.options.sourcemap.unwrap_or(if context.source_map {
            SourceMapMode::External
        } else {
            SourceMapMode::None
        });

        let request = TransformRequest {
            source_text: source.to_string(),
            file_path: context.resource_path.clone(),
            dialect: self.options.loader,
            target: self.options.target.clone().unwrap_or_default(),
            source_map,
            extra_options: self.options.extra.clone(),
        };

        let result = self.transform_file(&request, &config).await.map_err(|source| {
            RivetError::Transform { path: context.resource_path.display().to_string(), source }
        })?;

        for warning in &result.warnings {
            warn!(file = %context.resource_path.display(), "{warning}");
        }
        warnings.extend(result.warnings.iter().map(ToString::to_string));

        Ok(LoaderOutput { code: result.code, map: result.map, warnings })
    }

    /// Transform a request under `config`, retrying once under the strict
    /// grammar when the permissive one rejects the input.
    pub async fn transform_file(
        &self,
        request: &TransformRequest,
        config: &EffectiveConfig,
    ) -> Result<TransformResult, TransformError> {
        let mut config_layer = Map::new();
        if !config.is_empty() {
            config_layer.insert("tsconfigRaw".to_string(), Value::Object(config.parsed_options.clone()));
        }
        let merged = merge_layers(&self.defaults, &config_layer, &request.extra_options);

        let options = TransformOptions {
            target: request.target.clone(),
            dialect: request.dialect(),
            source_map: request.source_map,
            source_file: request.file_path.display().to_string(),
            dynamic_import: true,
            ..TransformOptions::from_extra(merged)?
        };

        transform_with_fallback(self.transform.as_ref(), &request.source_text, &options).await
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }
}

enum FallbackState {
    Initial,
    Retrying(TransformError),
    Done(TransformResult),
    Failed(TransformError),
}

/// Run `transform`, retrying once with the strict variant of a superset
/// dialect. When the retry fails too, the first error is reported.
pub(crate) async fn transform_with_fallback(
    transform: &dyn Transform,
    source: &str,
    options: &TransformOptions,
) -> Result<TransformResult, TransformError> {
    let mut state = FallbackState::Initial;

    loop {
        state = match state {
            FallbackState::Initial => match transform.transform(source, options).await {
                Ok(result) => FallbackState::Done(result),
                Err(error) if options.dialect.is_superset() && is_dialect_mismatch(&error) => {
                    FallbackState::Retrying(error)
                }
                Err(error) => FallbackState::Failed(error),
            },
            FallbackState::Retrying(original) => {
                let Some(strict) = options.dialect.strict_variant() else {
                    return Err(original);
                };
                debug!(file = %options.source_file, from = %options.dialect, to = %strict, "Retrying transform");

                match transform.transform(source, &options.with_dialect(strict)).await {
                    Ok(result) => FallbackState::Done(result),
                    Err(_) => FallbackState::Failed(original),
                }
            }
            FallbackState::Done(result) => return Ok(result),
            FallbackState::Failed(error) => return Err(error),
        };
    }
}

fn is_dialect_mismatch(error: &TransformError) -> bool {
    dialect_mismatch_regex().is_match(&error.message)
}
