use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use rustc_hash::FxHashSet;
use std::path::{Component, Path, PathBuf};

/// Directories excluded when a configuration declares no `exclude`
const DEFAULT_EXCLUDE: &[&str] = &["node_modules", "bower_components", "jspm_packages"];

/// A `files`/`include`/`exclude` list together with the directory it is relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub root: PathBuf,
    pub patterns: Vec<String>,
}

impl Scope {
    pub fn new(root: &Path, patterns: Vec<String>) -> Self {
        Self { root: root.to_path_buf(), patterns }
    }
}

/// Decides whether a file belongs to a configuration's declared scope.
///
/// Follows the compiler's rules: explicit `files` always match, `include`
/// defaults to every file under the configuration directory unless `files`
/// is given, and `exclude` only filters what `include` picked up.
pub struct IncludeMatcher {
    files: FxHashSet<PathBuf>,
    include: Option<CompiledScope>,
    exclude: Option<CompiledScope>,
}

struct CompiledScope {
    root: PathBuf,
    globs: GlobSet,
}

impl CompiledScope {
    fn new(scope: &Scope, directory_suffix: &str) -> Result<Self, globset::Error> {
        Ok(Self {
            root: scope.root.clone(),
            globs: compile_globset(&scope.patterns, directory_suffix)?,
        })
    }

    fn is_match(&self, file: &Path) -> bool {
        let Ok(relative) = file.strip_prefix(&self.root) else {
            return false;
        };
        self.globs.is_match(relative)
    }
}

impl IncludeMatcher {
    /// `config_dir` is the directory of the configuration file that started the chain
    pub fn new(
        config_dir: &Path,
        files: Option<&Scope>,
        include: Option<&Scope>,
        exclude: Option<&Scope>,
    ) -> Result<Self, globset::Error> {
        let files_set = files
            .map(|scope| {
                scope.patterns.iter().map(|file| normalize(&scope.root.join(file))).collect()
            })
            .unwrap_or_default();

        let include = match (include, files) {
            (Some(scope), _) => Some(CompiledScope::new(scope, "/**/*")?),
            // Only explicit files
            (None, Some(_)) => None,
            (None, None) => Some(CompiledScope::new(
                &Scope::new(config_dir, vec!["**/*".to_string()]),
                "/**/*",
            )?),
        };

        let default_exclude;
        let exclude = match exclude {
            Some(scope) => scope,
            None => {
                default_exclude = Scope::new(
                    config_dir,
                    DEFAULT_EXCLUDE.iter().map(|dir| (*dir).to_string()).collect(),
                );
                &default_exclude
            }
        };

        Ok(Self {
            files: files_set,
            include,
            exclude: Some(CompiledScope::new(exclude, "/**")?),
        })
    }

    pub fn matches(&self, file: &Path) -> bool {
        let file = normalize(file);
        if self.files.contains(&file) {
            return true;
        }

        let included = self.include.as_ref().is_some_and(|scope| scope.is_match(&file));
        let excluded = self.exclude.as_ref().is_some_and(|scope| scope.is_match(&file));
        included && !excluded
    }
}

/// Expand brace patterns like `src/**/*.{ts,tsx}` into multiple patterns
fn expand_brace_pattern(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];
            let alternatives = &pattern[start + 1..end];

            return alternatives
                .split(',')
                .flat_map(|alt| expand_brace_pattern(&format!("{prefix}{alt}{suffix}")))
                .collect();
        }
    }
    vec![pattern.to_string()]
}

/// Compile patterns relative to a scope root. Patterns naming a directory
/// (no wildcard and no extension in the last segment) also match everything
/// below it via `directory_suffix`.
fn compile_globset(patterns: &[String], directory_suffix: &str) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
        for expanded in expand_brace_pattern(pattern) {
            builder.add(glob(&expanded)?);
            if names_directory(&expanded) {
                builder.add(glob(&format!("{expanded}{directory_suffix}"))?);
            }
        }
    }
    builder.build()
}

fn glob(pattern: &str) -> Result<Glob, globset::Error> {
    // `*` must not cross directory boundaries, only `**` does
    GlobBuilder::new(pattern).literal_separator(true).build()
}

fn names_directory(pattern: &str) -> bool {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    !last.contains(['*', '?', '.'])
}

/// Lexically resolve `.` and `..` so paths compare equal without touching the filesystem
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
