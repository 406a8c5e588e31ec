use crate::host::{Compilation, snapshot_assets};
use crate::lifecycle::Lifecycle;
use crate::loader::Loader;
use crate::minify::MinifyPlugin;
use crate::options::{LoaderOptions, MinifyOptions};
use crate::reporter::Report;
use crate::transform::{Transform, TransformRegistry};
use crate::tsconfig::ConfigResolver;
use crate::types::RivetError;
use std::path::Path;
use std::sync::Arc;

/// State shared by every loader and pass created from one plugin
pub struct PluginContext {
    pub resolver: Arc<ConfigResolver>,
    pub lifecycle: Lifecycle,
}

/// Entry point a host integration holds for the lifetime of the process
pub struct RivetPlugin {
    registry: Arc<TransformRegistry>,
    transform: Arc<dyn Transform>,
    context: PluginContext,
}

impl RivetPlugin {
    /// Fails immediately when `implementation` is not registered
    pub fn new(
        cwd: &Path,
        registry: Arc<TransformRegistry>,
        implementation: Option<&str>,
    ) -> Result<Self, RivetError> {
        let transform = registry.resolve(implementation)?;
        let context = PluginContext {
            resolver: Arc::new(ConfigResolver::new(cwd)),
            lifecycle: Lifecycle::new(transform.clone()),
        };
        Ok(Self { registry, transform, context })
    }

    pub fn with_builtins(cwd: &Path) -> Result<Self, RivetError> {
        Self::new(cwd, Arc::new(TransformRegistry::with_builtins()), None)
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn implementation(&self) -> &str {
        self.transform.name()
    }

    pub fn loader(&self, options: LoaderOptions) -> Result<Loader, RivetError> {
        let transform = self.transform_for(options.implementation.as_deref())?;
        Ok(Loader::new(options, transform, self.context.resolver.clone()))
    }

    pub fn minify_plugin(&self, options: MinifyOptions) -> Result<MinifyPlugin, RivetError> {
        let transform = self.transform_for(options.implementation.as_deref())?;
        Ok(MinifyPlugin::new(options, transform))
    }

    /// Start of a build pass: bring the service up, forget configuration
    /// read by the previous pass
    pub async fn begin_build(&self, watching: bool) -> Result<(), RivetError> {
        self.context.resolver.clear();
        if watching {
            self.context.lifecycle.on_watch_run().await
        } else {
            self.context.lifecycle.on_run().await
        }
    }

    pub async fn end_build(&self) {
        self.context.lifecycle.on_done().await;
    }

    /// Run a whole optimization pass over `compilation` and report its assets
    pub async fn process(&self, compilation: &dyn Compilation, minify: &MinifyPlugin) -> Result<Report, RivetError> {
        self.begin_build(compilation.is_watching()).await?;
        let result = minify.run(compilation).await;
        self.end_build().await;

        let summary = result?;
        let assets = snapshot_assets(compilation)?;
        Ok(Report::new(&assets, summary.host_api.annotates_stats()))
    }

    fn transform_for(&self, implementation: Option<&str>) -> Result<Arc<dyn Transform>, RivetError> {
        match implementation {
            Some(name) => self.registry.resolve(Some(name)),
            None => Ok(self.transform.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{AssetInfo, MemoryCompilation};
    use crate::transform::{TransformError, TransformOptions, TransformResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Upper {
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Transform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }

        async fn transform(
            &self,
            source: &str,
            _options: &TransformOptions,
        ) -> Result<TransformResult, TransformError> {
            Ok(TransformResult { code: source.to_uppercase(), ..Default::default() })
        }
    }

    fn registry(upper: Arc<Upper>) -> Arc<TransformRegistry> {
        let mut registry = TransformRegistry::with_builtins();
        registry.register(upper);
        Arc::new(registry)
    }

    #[test]
    fn test_unknown_implementation_rejected_at_construction() {
        let result = RivetPlugin::new(Path::new("."), Arc::new(TransformRegistry::with_builtins()), Some("esbuild"));
        assert!(matches!(result, Err(RivetError::UnknownImplementation { .. })));

        let plugin = RivetPlugin::with_builtins(Path::new(".")).unwrap();
        assert_eq!(plugin.implementation(), "oxc");
        let options: MinifyOptions = serde_json::from_value(json!({ "implementation": "esbuild" })).unwrap();
        assert!(plugin.minify_plugin(options).is_err());
    }

    #[tokio::test]
    async fn test_process_reports_minimized_assets() {
        let upper = Arc::new(Upper::default());
        let plugin = RivetPlugin::new(Path::new("."), registry(upper.clone()), Some("upper")).unwrap();
        let minify = plugin.minify_plugin(MinifyOptions::default()).unwrap();

        let compilation = MemoryCompilation::new();
        compilation.insert_asset("main.js", "a()", None, AssetInfo::default());
        compilation.insert_asset("main.css", "a{}", None, AssetInfo::default());

        let report = plugin.process(&compilation, &minify).await.unwrap();
        assert!(report.annotate);
        assert_eq!(report.minimized_count, 1);
        assert_eq!(compilation.asset("main.js").unwrap().source, "A()");
        assert_eq!(upper.stops.load(Ordering::Relaxed), 1);
        assert!(!plugin.context().lifecycle.is_running().await);
    }

    #[tokio::test]
    async fn test_watching_build_keeps_service() {
        let upper = Arc::new(Upper::default());
        let plugin = RivetPlugin::new(Path::new("."), registry(upper.clone()), Some("upper")).unwrap();
        let minify = plugin.minify_plugin(MinifyOptions::default()).unwrap();

        for _ in 0..2 {
            let compilation = MemoryCompilation::new().legacy().watching(true);
            let report = plugin.process(&compilation, &minify).await.unwrap();
            assert!(!report.annotate);
        }

        assert_eq!(upper.stops.load(Ordering::Relaxed), 0);
        assert_eq!(plugin.context().lifecycle.start_count(), 1);
    }

    #[tokio::test]
    async fn test_loader_uses_named_implementation() {
        let upper = Arc::new(Upper::default());
        let plugin = RivetPlugin::new(Path::new("/"), registry(upper), None).unwrap();
        let options: LoaderOptions =
            serde_json::from_value(json!({ "implementation": "upper", "tsconfigRaw": {} })).unwrap();
        let loader = plugin.loader(options).unwrap();

        let context = crate::loader::LoaderContext { resource_path: "/src/a.js".into(), source_map: false };
        assert_eq!(loader.run("let a", &context).await.unwrap().code, "LET A");
    }
}
