use super::matcher::{IncludeMatcher, Scope, normalize};
use super::{CONFIG_FILE_NAME, ConfigError, EffectiveConfig, Resolution, is_dependency_path};
use dashmap::DashMap;
use oxc_resolver::{ResolveOptions, Resolver};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// A parsed configuration file with its `extends` chain flattened
struct ParsedConfig {
    options: Map<String, Value>,
    matcher: IncludeMatcher,
}

/// One file of an `extends` chain, or the merge of several
#[derive(Default)]
struct Layer {
    options: Map<String, Value>,
    files: Option<Scope>,
    include: Option<Scope>,
    exclude: Option<Scope>,
}

impl Layer {
    fn from_object(mut object: Map<String, Value>, path: &Path, dir: &Path) -> Result<Self, ConfigError> {
        let mut scope = |key: &str| -> Result<Option<Scope>, ConfigError> {
            match object.remove(key) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => string_list(value)
                    .map(|patterns| Some(Scope::new(dir, patterns)))
                    .ok_or_else(|| parse_error(path, format!("`{key}` must be an array of strings"))),
            }
        };
        let files = scope("files")?;
        let include = scope("include")?;
        let exclude = scope("exclude")?;

        Ok(Self { options: object, files, include, exclude })
    }

    /// Apply `other` on top; `compilerOptions` merge key by key
    fn overlay(&mut self, other: Layer) {
        for (key, value) in other.options {
            match (self.options.get_mut(&key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) if key == "compilerOptions" => {
                    existing.extend(incoming);
                }
                (_, value) => {
                    self.options.insert(key, value);
                }
            }
        }
        if other.files.is_some() {
            self.files = other.files;
        }
        if other.include.is_some() {
            self.include = other.include;
        }
        if other.exclude.is_some() {
            self.exclude = other.exclude;
        }
    }
}

/// Finds and parses the configuration governing each file.
///
/// Parsed files are cached by absolute path for the lifetime of the resolver
/// (one build pass); `clear` starts over for the next pass.
pub struct ConfigResolver {
    cwd: PathBuf,
    configs: DashMap<PathBuf, Result<Arc<ParsedConfig>, ConfigError>>,
    nearest: DashMap<PathBuf, Option<PathBuf>>,
    parses: AtomicUsize,
    packages: Resolver,
}

impl ConfigResolver {
    pub fn new(cwd: &Path) -> Self {
        let options = ResolveOptions {
            extensions: vec![".json".into()],
            main_files: vec!["tsconfig".into()],
            condition_names: vec!["node".into(), "require".into(), "default".into()],
            ..Default::default()
        };

        Self {
            cwd: cwd.to_path_buf(),
            configs: DashMap::new(),
            nearest: DashMap::new(),
            parses: AtomicUsize::new(0),
            packages: Resolver::new(options),
        }
    }

    /// Resolve the configuration for `file`.
    ///
    /// With `pinned`, that file always applies and a scope mismatch is only
    /// reported as a warning. Without it, the nearest ancestor `tsconfig.json`
    /// applies to the files inside its declared scope.
    pub fn resolve(&self, file: &Path, pinned: Option<&Path>) -> Result<Resolution, ConfigError> {
        let file = self.absolute(file);

        let config_path = match pinned {
            Some(path) => Some(self.absolute(path)),
            None => file.parent().and_then(|dir| self.find_nearest(dir)),
        };
        let Some(config_path) = config_path else {
            return Ok(Resolution::default());
        };

        let parsed = match self.load(&config_path) {
            Ok(parsed) => parsed,
            Err(error) if is_dependency_path(&file) => {
                warn!(file = %file.display(), "{error}");
                return Ok(Resolution { config: EffectiveConfig::empty(), warnings: vec![error.to_string()] });
            }
            Err(error) => return Err(error),
        };

        let matches = parsed.matcher.matches(&file);
        let mut warnings = Vec::new();

        if pinned.is_some() && !matches {
            let warning = format!(
                "{} is not included by {}; applying its settings anyway",
                file.display(),
                config_path.display()
            );
            warn!("{warning}");
            warnings.push(warning);
        }

        let parsed_options =
            if pinned.is_some() || matches { parsed.options.clone() } else { Map::new() };

        Ok(Resolution {
            config: EffectiveConfig {
                source_path: Some(config_path),
                parsed_options,
                matches_include_patterns: matches,
            },
            warnings,
        })
    }

    /// Number of configuration files parsed so far
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    /// Drop every cached lookup and parse
    pub fn clear(&self) {
        self.configs.clear();
        self.nearest.clear();
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        normalize(&self.cwd.join(path))
    }

    fn find_nearest(&self, dir: &Path) -> Option<PathBuf> {
        if let Some(found) = self.nearest.get(dir) {
            return found.clone();
        }

        let found = dir
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file());

        self.nearest.insert(dir.to_path_buf(), found.clone());
        found
    }

    fn load(&self, path: &Path) -> Result<Arc<ParsedConfig>, ConfigError> {
        // Fast path: already cached
        if let Some(found) = self.configs.get(path) {
            debug!(path = %path.display(), "Tsconfig cache hit");
            return found.clone();
        }

        // The shard stays locked while parsing, so racing callers wait for one parse
        self.configs
            .entry(path.to_path_buf())
            .or_insert_with(|| self.parse(path).map(Arc::new))
            .clone()
    }

    fn parse(&self, path: &Path) -> Result<ParsedConfig, ConfigError> {
        self.parses.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "Parsing tsconfig");

        let layer = self.read_layer(path, &mut Vec::new())?;
        let dir = path.parent().unwrap_or(path);
        let matcher = IncludeMatcher::new(
            dir,
            layer.files.as_ref(),
            layer.include.as_ref(),
            layer.exclude.as_ref(),
        )
        .map_err(|e| parse_error(path, e.to_string()))?;

        Ok(ParsedConfig { options: layer.options, matcher })
    }

    fn read_layer(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Layer, ConfigError> {
        if chain.iter().any(|seen| seen == path) {
            return Err(ConfigError::CircularExtends { path: path.to_path_buf() });
        }
        chain.push(path.to_path_buf());

        let Value::Object(mut object) = read_jsonc(path)? else {
            return Err(parse_error(path, "expected a JSON object"));
        };
        let dir = path.parent().unwrap_or(path);

        let extends = match object.remove("extends") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => string_list(value)
                .ok_or_else(|| parse_error(path, "`extends` must be a string or an array of strings"))?,
        };

        let mut merged = Layer::default();
        for specifier in extends {
            let base = self.resolve_extends(dir, &specifier).ok_or_else(|| ConfigError::Extends {
                path: path.to_path_buf(),
                specifier: specifier.clone(),
            })?;
            merged.overlay(self.read_layer(&base, chain)?);
        }
        merged.overlay(Layer::from_object(object, path, dir)?);

        chain.pop();
        Ok(merged)
    }

    fn resolve_extends(&self, dir: &Path, specifier: &str) -> Option<PathBuf> {
        let is_local = specifier.starts_with("./")
            || specifier.starts_with("../")
            || Path::new(specifier).is_absolute();

        if is_local {
            let target = normalize(&dir.join(specifier));

            // Try exact path first
            if target.is_file() {
                return Some(target);
            }

            // Try with .json extension if not present
            if !specifier.ends_with(".json") {
                let with_ext = PathBuf::from(format!("{}.json", target.display()));
                if with_ext.is_file() {
                    return Some(with_ext);
                }
            }

            let nested = target.join(CONFIG_FILE_NAME);
            return nested.is_file().then_some(nested);
        }

        // Package specifier, looked up through ancestor node_modules
        self.packages.resolve(dir, specifier).ok().map(|resolution| resolution.into_path_buf())
    }
}

fn read_jsonc(path: &Path) -> Result<Value, ConfigError> {
    let mut content = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound { path: path.to_path_buf() },
        _ => ConfigError::Io { path: path.to_path_buf(), message: e.to_string() },
    })?;
    json_strip_comments::strip(&mut content).map_err(|e| parse_error(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| parse_error(path, e.to_string()))
}

fn parse_error(path: &Path, message: impl Into<String>) -> ConfigError {
    ConfigError::Parse { path: path.to_path_buf(), message: message.into() }
}

/// A string or an array of strings
fn string_list(value: Value) -> Option<Vec<String>> {
    match value {
        Value::String(single) => Some(vec![single]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_no_config_found() {
        let dir = tempdir().unwrap();
        let resolver = ConfigResolver::new(dir.path());
        let resolution = resolver.resolve(Path::new("src/index.ts"), None).unwrap();
        // A tsconfig.json above the temp dir would be picked up; only assert on a clean tree
        if resolution.config.source_path.is_none() {
            assert!(resolution.config.is_empty());
            assert_eq!(resolver.parse_count(), 0);
        }
    }

    #[test]
    fn test_nearest_config_wins() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tsconfig.json", r#"{ "compilerOptions": { "target": "es2017" } }"#);
        let nested = write(dir.path(), "packages/a/tsconfig.json", r#"{ "compilerOptions": { "target": "es2020" } }"#);

        let resolver = ConfigResolver::new(dir.path());
        let resolution = resolver.resolve(Path::new("packages/a/src/index.ts"), None).unwrap();
        assert_eq!(resolution.config.source_path, Some(nested));
        assert_eq!(resolution.config.compiler_options().unwrap()["target"], "es2020");
    }

    #[test]
    fn test_shared_config_parsed_once() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#);

        let resolver = ConfigResolver::new(dir.path());
        let a = resolver.resolve(Path::new("src/a.ts"), None).unwrap();
        let b = resolver.resolve(Path::new("src/nested/b.ts"), None).unwrap();
        assert_eq!(a.config, b.config);
        assert_eq!(resolver.parse_count(), 1);

        resolver.clear();
        resolver.resolve(Path::new("src/a.ts"), None).unwrap();
        assert_eq!(resolver.parse_count(), 2);
    }

    #[test]
    fn test_unpinned_config_only_applies_inside_scope() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tsconfig.json", r#"{ "compilerOptions": { "strict": true }, "include": ["src/strict.ts"] }"#);

        let resolver = ConfigResolver::new(dir.path());
        let strict = resolver.resolve(Path::new("src/strict.ts"), None).unwrap();
        let index = resolver.resolve(Path::new("src/index.ts"), None).unwrap();

        assert!(strict.config.matches_include_patterns);
        assert_eq!(strict.config.compiler_options().unwrap()["strict"], true);
        assert!(!index.config.matches_include_patterns);
        assert!(index.config.is_empty());
        assert!(index.warnings.is_empty());
    }

    #[test]
    fn test_pinned_config_applies_with_warning() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tsconfig.custom.json", r#"{ "compilerOptions": { "strict": true }, "include": ["src/strict.ts"] }"#);

        let resolver = ConfigResolver::new(dir.path());
        let pinned = Path::new("./tsconfig.custom.json");
        let index = resolver.resolve(Path::new("src/index.ts"), Some(pinned)).unwrap();

        assert!(!index.config.matches_include_patterns);
        assert_eq!(index.config.compiler_options().unwrap()["strict"], true);
        assert_eq!(index.warnings.len(), 1);

        let strict = resolver.resolve(Path::new("src/strict.ts"), Some(pinned)).unwrap();
        assert!(strict.warnings.is_empty());
        assert_eq!(resolver.parse_count(), 1);
    }

    #[test]
    fn test_pinned_config_missing() {
        let dir = tempdir().unwrap();
        let resolver = ConfigResolver::new(dir.path());
        let result = resolver.resolve(Path::new("src/index.ts"), Some(Path::new("missing.json")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_jsonc_with_comments() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "tsconfig.json",
            r#"{
                // line comment
                "compilerOptions": { /* block */ "jsx": "react" }
            }"#,
        );
        let resolver = ConfigResolver::new(dir.path());
        let resolution = resolver.resolve(Path::new("a.tsx"), None).unwrap();
        assert_eq!(resolution.config.compiler_options().unwrap()["jsx"], "react");
    }

    #[test]
    fn test_extends_chain_merges_compiler_options() {
        let dir = tempdir().unwrap();
        write(dir.path(), "configs/base.json", r#"{ "compilerOptions": { "strict": true, "target": "es2017" }, "include": ["src"] }"#);
        write(dir.path(), "configs/jsx.json", r#"{ "compilerOptions": { "jsx": "react-jsx" } }"#);
        write(
            dir.path(),
            "tsconfig.json",
            r#"{ "extends": ["./configs/base", "./configs/jsx.json"], "compilerOptions": { "target": "es2020" } }"#,
        );

        let resolver = ConfigResolver::new(dir.path());
        let options = resolver.resolve(Path::new("a.ts"), None).unwrap();
        // `include` is inherited relative to configs/, so a.ts at the root is outside it
        assert!(!options.config.matches_include_patterns);

        // configs/ has no tsconfig.json of its own, so the root one governs
        let inside = resolver.resolve(Path::new("configs/src/a.ts"), None).unwrap().config;
        assert!(inside.matches_include_patterns);
        assert!(!inside.parsed_options.contains_key("extends"));
        let compiler = inside.compiler_options().unwrap();
        assert_eq!(compiler["strict"], true);
        assert_eq!(compiler["jsx"], "react-jsx");
        assert_eq!(compiler["target"], "es2020");
        assert_eq!(resolver.parse_count(), 1);
    }

    #[test]
    fn test_extends_package_from_node_modules() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/@tsconfig/strictest/package.json", r#"{ "name": "@tsconfig/strictest", "version": "1.0.0" }"#);
        write(dir.path(), "node_modules/@tsconfig/strictest/tsconfig.json", r#"{ "compilerOptions": { "strict": true } }"#);
        write(dir.path(), "tsconfig.json", r#"{ "extends": "@tsconfig/strictest" }"#);

        let resolver = ConfigResolver::new(dir.path());
        let resolution = resolver.resolve(Path::new("src/a.ts"), None).unwrap();
        assert_eq!(resolution.config.compiler_options().unwrap()["strict"], true);
    }

    #[test]
    fn test_unresolvable_extends_is_fatal_for_project_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "tsconfig.json", r#"{ "extends": "./missing.json" }"#);

        let resolver = ConfigResolver::new(dir.path());
        let result = resolver.resolve(Path::new("src/a.ts"), None);
        assert!(matches!(result, Err(ConfigError::Extends { .. })));
        // Failures are cached too
        assert!(resolver.resolve(Path::new("src/b.ts"), None).is_err());
        assert_eq!(resolver.parse_count(), 1);
    }

    #[test]
    fn test_invalid_config_is_warning_for_dependencies() {
        let dir = tempdir().unwrap();
        write(dir.path(), "node_modules/pkg/tsconfig.json", "{ not json");

        let resolver = ConfigResolver::new(dir.path());
        let resolution = resolver.resolve(Path::new("node_modules/pkg/index.ts"), None).unwrap();
        assert!(resolution.config.is_empty());
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].contains("Failed to parse tsconfig"));
    }

    #[test]
    fn test_circular_extends() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.json", r#"{ "extends": "./b.json" }"#);
        write(dir.path(), "b.json", r#"{ "extends": "./a.json" }"#);

        let resolver = ConfigResolver::new(dir.path());
        let result = resolver.resolve(Path::new("x.ts"), Some(Path::new("a.json")));
        assert!(matches!(result, Err(ConfigError::CircularExtends { .. })));
    }
}
