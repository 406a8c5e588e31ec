pub mod cli;
pub mod collector;
pub mod filter;
pub mod host;
pub mod lifecycle;
pub mod loader;
pub mod minify;
pub mod options;
pub mod plugin;
pub mod reporter;
pub mod sourcemap;
pub mod transform;
pub mod tsconfig;
pub mod types;

use std::fs;
use std::path::Path;

pub use collector::OutputCollector;
pub use filter::{Filter, FilterCriteria, select_assets};
pub use host::{Compilation, HostApi, MemoryCompilation};
pub use loader::{Loader, LoaderContext, LoaderOutput, TransformRequest};
pub use minify::{MinifyPlugin, MinifySummary};
pub use options::{FileConfig, LoaderOptions, MinifyOptions};
pub use plugin::{PluginContext, RivetPlugin};
pub use reporter::Report;
pub use sourcemap::SourceMap;
pub use transform::{Transform, TransformError, TransformOptions, TransformRegistry, TransformResult};
pub use tsconfig::{ConfigError, ConfigResolver, EffectiveConfig};
pub use types::{Dialect, LegalComments, RivetError, SourceMapMode, Target};

/// Run the loader over one file on disk, as a single build
///
/// # Example
/// ```no_run
/// use rivet::{LoaderOptions, RivetPlugin, transform_path};
/// use std::path::Path;
///
/// # async fn run() -> Result<(), rivet::RivetError> {
/// let plugin = RivetPlugin::with_builtins(Path::new("."))?;
/// let output = transform_path(&plugin, Path::new("src/index.ts"), LoaderOptions::default()).await?;
/// println!("{}", output.code);
/// # Ok(())
/// # }
/// ```
pub async fn transform_path(
    plugin: &RivetPlugin,
    file: &Path,
    options: LoaderOptions,
) -> Result<LoaderOutput, RivetError> {
    let source = fs::read_to_string(file)?;
    let source_map = options.sourcemap.is_some_and(SourceMapMode::is_enabled);
    let loader = plugin.loader(options)?;

    plugin.begin_build(false).await?;
    let context = LoaderContext { resource_path: file.to_path_buf(), source_map };
    let result = loader.run(&source, &context).await;
    plugin.end_build().await;
    result
}

/// Minify a build output directory in place and report its assets.
/// Existing `<asset>.map` files switch source maps on and are chained.
pub async fn minify_directory(
    plugin: &RivetPlugin,
    dir: &Path,
    options: MinifyOptions,
) -> Result<Report, RivetError> {
    let collector = OutputCollector::new(dir);
    let compilation = MemoryCompilation::new();
    let compilation =
        if collector.collect(&compilation)? { compilation.with_devtool("source-map") } else { compilation };

    let minify = plugin.minify_plugin(options)?;
    let report = plugin.process(&compilation, &minify).await?;
    collector.write_back(&compilation)?;

    Ok(report.with_warnings(compilation.warnings()))
}
