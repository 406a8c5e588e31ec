use napi::bindgen_prelude::*;
use napi_derive::napi;
use rivet::{LoaderOptions, MinifyOptions, RivetPlugin, minify_directory, transform_path};
use std::path::PathBuf;

/// Options for transforming one file
#[napi(object)]
pub struct TransformFileOptions {
    /// File to transform
    pub file: String,

    /// Working directory (defaults to current directory)
    pub cwd: Option<String>,

    /// Loader options as a JSON string (target, loader, tsconfig, sourcemap, ...)
    pub options: Option<String>,
}

/// Result of transforming one file
#[napi(object)]
pub struct TransformFileOutput {
    pub code: String,

    /// Source map as a JSON string
    pub map: Option<String>,

    pub warnings: Vec<String>,
}

/// Options for minifying an output directory
#[napi(object)]
pub struct MinifyDirectoryOptions {
    /// Build output directory
    pub dir: String,

    /// Working directory (defaults to current directory)
    pub cwd: Option<String>,

    /// Minify options as a JSON string (include, exclude, css, legalComments, ...)
    pub options: Option<String>,
}

/// Per-asset stats after a minify pass
#[napi(object)]
pub struct AssetStats {
    pub name: String,
    pub size: u32,
    pub minimized: bool,
}

#[napi(object)]
pub struct MinifyDirectoryReport {
    pub assets: Vec<AssetStats>,
    pub total_assets: u32,
    pub minimized_count: u32,
    pub warnings: Vec<String>,
}

fn parse_options<T: serde::de::DeserializeOwned + Default>(json: Option<String>) -> Result<T> {
    match json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| Error::from_reason(format!("Invalid options: {e}"))),
        None => Ok(T::default()),
    }
}

fn plugin_for(cwd: Option<String>) -> Result<(RivetPlugin, PathBuf)> {
    let cwd = cwd.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let cwd = cwd.canonicalize().map_err(|e| Error::from_reason(format!("Invalid cwd: {e}")))?;
    let plugin = RivetPlugin::with_builtins(&cwd).map_err(|e| Error::from_reason(e.to_string()))?;
    Ok((plugin, cwd))
}

/// Transform one source file (async)
///
/// @param options - File, working directory and loader options
/// @returns Promise with the generated code, map and warnings
#[napi]
pub async fn transform(options: TransformFileOptions) -> Result<TransformFileOutput> {
    let loader_options: LoaderOptions = parse_options(options.options)?;
    let (plugin, cwd) = plugin_for(options.cwd)?;

    let output = transform_path(&plugin, &cwd.join(&options.file), loader_options)
        .await
        .map_err(|e| Error::from_reason(e.to_string()))?;

    Ok(TransformFileOutput {
        code: output.code,
        map: output.map.map(|map| map.to_json()),
        warnings: output.warnings,
    })
}

/// Minify the assets of a build output directory in place (async)
///
/// @param options - Directory, working directory and minify options
/// @returns Promise with per-asset stats
#[napi]
pub async fn minify(options: MinifyDirectoryOptions) -> Result<MinifyDirectoryReport> {
    let minify_options: MinifyOptions = parse_options(options.options)?;
    let (plugin, cwd) = plugin_for(options.cwd)?;

    let report = minify_directory(&plugin, &cwd.join(&options.dir), minify_options)
        .await
        .map_err(|e| Error::from_reason(e.to_string()))?;

    Ok(MinifyDirectoryReport {
        assets: report
            .assets
            .into_iter()
            .map(|asset| AssetStats { name: asset.name, size: asset.size as u32, minimized: asset.minimized })
            .collect(),
        total_assets: report.total_assets as u32,
        minimized_count: report.minimized_count as u32,
        warnings: report.warnings,
    })
}
