//! Whole-bundle minify pass over emitted assets.

use crate::filter::{AssetRef, FileType, FileTypeRule, FilterCriteria, select_assets};
use crate::host::{AssetInfo, AssetSource, Compilation, HostApi, HostError};
use crate::loader::transform_with_fallback;
use crate::options::MinifyOptions;
use crate::sourcemap::SourceMap;
use crate::transform::{Transform, TransformOptions};
use crate::types::{Dialect, LegalComments, RivetError, SourceMapMode};
use futures::future::try_join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const PLUGIN_NAME: &str = "RivetMinifyPlugin";

/// Suffix of the sibling asset receiving extracted license comments
pub const LEGAL_SUFFIX: &str = ".LEGAL.txt";

/// What one pass changed
#[derive(Debug, Clone, PartialEq)]
pub struct MinifySummary {
    pub host_api: HostApi,
    /// Rewritten assets, in enumeration order
    pub minimized: Vec<String>,
    /// Emitted license comment files
    pub legal_files: Vec<String>,
}

/// A transformed asset waiting to be committed
struct Minified {
    name: String,
    code: String,
    map: Option<SourceMap>,
    info: AssetInfo,
    legal_comments: Option<String>,
    warnings: Vec<String>,
}

pub struct MinifyPlugin {
    options: MinifyOptions,
    criteria: FilterCriteria,
    transform: Arc<dyn Transform>,
}

impl MinifyPlugin {
    pub fn new(options: MinifyOptions, transform: Arc<dyn Transform>) -> Self {
        let options = options.normalized();
        let criteria = options.criteria();
        Self { options, criteria, transform }
    }

    pub fn options(&self) -> &MinifyOptions {
        &self.options
    }

    /// Identity of this pass's configuration, mixed into the build hash so
    /// changing options invalidates cached output
    pub fn fingerprint(&self) -> String {
        json!({
            "name": PLUGIN_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "options": &self.options,
        })
        .to_string()
    }

    /// Minify every eligible asset of `compilation`.
    ///
    /// Transforms run concurrently; the first failure aborts the pass and no
    /// asset is replaced unless every transform succeeded.
    pub async fn run(&self, compilation: &dyn Compilation) -> Result<MinifySummary, RivetError> {
        let host_api = HostApi::detect(compilation);
        compilation.update_hash(&self.fingerprint());

        let source_map = self.options.sourcemap.unwrap_or_else(|| {
            compilation.devtool().is_some_and(|devtool| devtool.contains("source-map"))
        });

        let rule = FileTypeRule { css: self.options.css };
        let selected = select_assets(host_api.candidate_assets(compilation), rule, &self.criteria);
        debug!(count = selected.len(), api = ?host_api, "Minifying assets");

        let base = self.base_options()?;
        let minified = try_join_all(
            selected.into_iter().map(|asset| self.minify_asset(compilation, asset, &base, source_map)),
        )
        .await?;

        check_commit(compilation, &minified)?;

        let mut summary = MinifySummary { host_api, minimized: Vec::new(), legal_files: Vec::new() };
        for asset in minified {
            if let Some(comments) = asset.legal_comments {
                let legal_name = legal_file_name(&asset.name);
                compilation.emit_asset(&legal_name, comments, AssetInfo::default())?;
                summary.legal_files.push(legal_name);
            }
            for warning in asset.warnings {
                compilation.warn(format!("{}: {warning}", asset.name));
            }
            compilation.update_asset(&asset.name, AssetSource { source: asset.code, map: asset.map }, asset.info)?;
            summary.minimized.push(asset.name);
        }

        Ok(summary)
    }

    fn base_options(&self) -> Result<TransformOptions, RivetError> {
        let forwarded = TransformOptions::from_extra(self.options.extra.clone())
            .map_err(|source| RivetError::Transform { path: PLUGIN_NAME.to_string(), source })?;

        Ok(TransformOptions {
            target: self.options.target.clone().unwrap_or_default(),
            minify: self.options.minify_flags(),
            legal_comments: self.options.legal_comments.unwrap_or_default(),
            ..forwarded
        })
    }

    async fn minify_asset(
        &self,
        compilation: &dyn Compilation,
        asset: AssetRef,
        base: &TransformOptions,
        source_map: bool,
    ) -> Result<Minified, RivetError> {
        let AssetSource { source, map: input_map } = compilation.read_asset(&asset.name, source_map)?;

        let dialect = match FileType::classify(&asset.name) {
            Some(FileType::Style) => Dialect::Css,
            _ => self.options.loader.unwrap_or(Dialect::Js),
        };
        let options = TransformOptions {
            dialect,
            source_map: if source_map { SourceMapMode::External } else { SourceMapMode::None },
            source_file: asset.name.clone(),
            ..base.clone()
        };

        let result = transform_with_fallback(self.transform.as_ref(), &source, &options)
            .await
            .map_err(|source| RivetError::Transform { path: asset.name.clone(), source })?;

        let map = match (result.map, input_map) {
            (Some(map), Some(previous)) if source_map => Some(map.chain(&previous)),
            (map, _) if source_map => map,
            _ => None,
        };

        let legal_comments =
            result.legal_comments.filter(|_| options.legal_comments == LegalComments::External);

        Ok(Minified {
            info: asset.info.minimized(),
            name: asset.name,
            code: result.code,
            map,
            legal_comments,
            warnings: result.warnings.iter().map(ToString::to_string).collect(),
        })
    }
}

fn legal_file_name(asset: &str) -> String {
    format!("{asset}{LEGAL_SUFFIX}")
}

/// Every write of a pass must be able to land before the first one does:
/// targets still exist and no license file would overwrite an asset.
fn check_commit(compilation: &dyn Compilation, minified: &[Minified]) -> Result<(), HostError> {
    for asset in minified {
        if compilation.asset_info(&asset.name).is_none() {
            return Err(HostError::MissingAsset(asset.name.clone()));
        }
        if asset.legal_comments.is_some() {
            let legal_name = legal_file_name(&asset.name);
            if compilation.asset_info(&legal_name).is_some() {
                return Err(HostError::AssetExists(legal_name));
            }
        }
    }
    Ok(())
}
