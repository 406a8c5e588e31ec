//! Default transform backed by the OXC toolchain.
//!
//! Parses by dialect, lowers TypeScript/JSX and newer syntax to the requested
//! target, then optionally compresses, mangles and strips whitespace.

use super::{Transform, TransformError, TransformOptions, TransformResult};
use crate::sourcemap::SourceMap;
use crate::types::{Dialect, LegalComments, Location, SourceMapMode};
use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, LegalComment};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxRuntime, TransformOptions as LowerOptions, Transformer};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Transform implementation running OXC on the blocking thread pool
pub struct OxcTransform;

impl OxcTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OxcTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transform for OxcTransform {
    fn name(&self) -> &str {
        "oxc"
    }

    async fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> Result<TransformResult, TransformError> {
        let source = source.to_string();
        let options = options.clone();

        // Parsing and codegen are CPU-bound
        tokio::task::spawn_blocking(move || compile(&source, &options))
            .await
            .map_err(|e| TransformError::new(format!("Transform task panicked: {e}")))?
    }
}

fn compile(source: &str, options: &TransformOptions) -> Result<TransformResult, TransformError> {
    let source_type = match options.dialect {
        Dialect::Js => SourceType::mjs(),
        Dialect::Jsx => SourceType::jsx(),
        Dialect::Ts => SourceType::ts(),
        Dialect::Tsx | Dialect::Default => SourceType::tsx(),
        Dialect::Json => return compile_json(source, options),
        Dialect::Css => {
            return Err(TransformError::new("The oxc transform does not support the css dialect"));
        }
    };

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(error) = parsed.errors.first() {
        return Err(TransformError::new(error.to_string()));
    }
    let mut program = parsed.program;

    let lower = lower_options(options)?;
    let semantic = SemanticBuilder::new().build(&program);
    let lowered = Transformer::new(&allocator, Path::new(&options.source_file), &lower)
        .build_with_scoping(semantic.semantic.into_scoping(), &mut program);
    if let Some(error) = lowered.errors.first() {
        return Err(TransformError::new(error.to_string()));
    }

    let flags = options.minify;
    let scoping = if flags.identifiers || flags.syntax {
        let minifier = Minifier::new(MinifierOptions {
            mangle: flags.identifiers.then(MangleOptions::default),
            compress: flags.syntax.then(CompressOptions::default),
        });
        minifier.minify(&allocator, &mut program).scoping
    } else {
        None
    };

    let mut codegen_options =
        if flags.whitespace { CodegenOptions::minify() } else { CodegenOptions::default() };
    codegen_options.comments.legal = legal_comment_mode(options.legal_comments);
    if options.source_map.is_enabled() {
        codegen_options.source_map_path = Some(PathBuf::from(&options.source_file));
    }

    let generated =
        Codegen::new().with_options(codegen_options).with_scoping(scoping).build(&program);

    // Comment spans point into the parsed source
    let legal_comments = (options.legal_comments == LegalComments::External
        && !generated.legal_comments.is_empty())
    .then(|| {
        generated
            .legal_comments
            .iter()
            .map(|comment| format!("{}\n", comment.span.source_text(source)))
            .collect::<String>()
    });

    let mut code = generated.code;
    let mut map = match generated.map {
        Some(map) => Some(
            SourceMap::from_json(&map.to_json_string())
                .map_err(|e| TransformError::new(e.to_string()))?,
        ),
        None => None,
    };

    if options.source_map == SourceMapMode::Inline {
        if let Some(map) = map.take() {
            if !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&map.to_inline_comment());
            code.push('\n');
        }
    }

    Ok(TransformResult { code, map, warnings: Vec::new(), legal_comments })
}

fn legal_comment_mode(mode: LegalComments) -> LegalComment {
    match mode {
        LegalComments::Inline => LegalComment::Inline,
        LegalComments::Eof => LegalComment::Eof,
        LegalComments::None => LegalComment::None,
        LegalComments::External => LegalComment::External,
    }
}

fn lower_options(options: &TransformOptions) -> Result<LowerOptions, TransformError> {
    let mut lower = LowerOptions::from_target(&options.target.to_string())
        .map_err(|e| TransformError::new(format!("Invalid target `{}`: {e}", options.target)))?;

    let option_str = |key: &str| options.compiler_option(key).and_then(Value::as_str);

    match option_str("jsx") {
        Some("react-jsx" | "react-jsxdev") => lower.jsx.runtime = JsxRuntime::Automatic,
        Some("react") => lower.jsx.runtime = JsxRuntime::Classic,
        _ => {}
    }
    if let Some(factory) = option_str("jsxFactory") {
        lower.jsx.pragma = Some(factory.to_string());
    }
    if let Some(fragment) = option_str("jsxFragmentFactory") {
        lower.jsx.pragma_frag = Some(fragment.to_string());
    }
    if let Some(import_source) = option_str("jsxImportSource") {
        lower.jsx.import_source = Some(import_source.to_string());
    }
    if options.compiler_option("experimentalDecorators").and_then(Value::as_bool) == Some(true) {
        lower.decorator.legacy = true;
    }

    Ok(lower)
}

fn compile_json(source: &str, options: &TransformOptions) -> Result<TransformResult, TransformError> {
    let value: Value = serde_json::from_str(source).map_err(|e| {
        TransformError::new(e.to_string()).with_location(Location {
            file: Some(options.source_file.clone()),
            line: e.line() as u32,
            column: e.column() as u32,
            line_text: None,
        })
    })?;

    let body = if options.minify.whitespace {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    }
    .map_err(|e| TransformError::new(e.to_string()))?;

    Ok(TransformResult { code: format!("module.exports = {body};\n"), ..Default::default() })
}
