use crate::host::{AssetInfo, MemoryCompilation};
use crate::sourcemap::SourceMap;
use crate::types::RivetError;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAP_SUFFIX: &str = ".map";

/// Loads a build output directory as assets and writes results back
pub struct OutputCollector {
    root: PathBuf,
}

impl OutputCollector {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    /// Insert every text file under the root as an asset named by its relative
    /// path. A `<name>.map` next to `<name>` becomes that asset's input map
    /// instead of an asset of its own. Returns whether any map was found.
    pub fn collect(&self, compilation: &MemoryCompilation) -> Result<bool, RivetError> {
        let mut files: FxHashMap<String, String> = FxHashMap::default();

        let mut walker_builder = WalkBuilder::new(&self.root);
        // Output directories are usually gitignored themselves
        walker_builder.hidden(false).git_ignore(false).ignore(false);

        // Always exclude node_modules directories during traversal
        let mut overrides = OverrideBuilder::new(&self.root);
        overrides.add("!**/node_modules/").ok();
        if let Ok(built) = overrides.build() {
            walker_builder.overrides(built);
        }

        for entry in walker_builder.build().flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let name = relative.to_string_lossy().replace('\\', "/");

            match fs::read_to_string(path) {
                Ok(content) => {
                    files.insert(name, content);
                }
                // Images, fonts and other binary outputs are not transformed
                Err(e) => debug!(file = %name, "Skipping unreadable asset: {e}"),
            }
        }

        let mut names: Vec<&String> = files.keys().collect();
        names.sort();

        let mut has_maps = false;
        for name in names {
            if let Some(target) = name.strip_suffix(MAP_SUFFIX) {
                if files.contains_key(target) {
                    continue;
                }
            }

            let map = match files.get(&format!("{name}{MAP_SUFFIX}")) {
                Some(json) => Some(SourceMap::from_json(json)?),
                None => None,
            };
            has_maps |= map.is_some();
            compilation.insert_asset(name.as_str(), files[name].as_str(), map, AssetInfo::default());
        }

        Ok(has_maps)
    }

    /// Write assets whose content changed, or that did not exist, back to disk.
    /// Assets carrying a map get a `<name>.map` file and a trailing
    /// `sourceMappingURL` comment.
    pub fn write_back(&self, compilation: &MemoryCompilation) -> Result<Vec<String>, RivetError> {
        let mut written = Vec::new();

        for asset in compilation.assets() {
            let path = self.root.join(&asset.name);
            let mut content = asset.source;

            if let Some(map) = &asset.map {
                let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                let url = format!("//# sourceMappingURL={file_name}{MAP_SUFFIX}");
                if !content.contains(&url) {
                    if !content.ends_with('\n') {
                        content.push('\n');
                    }
                    content.push_str(&url);
                    content.push('\n');
                }

                let map_path = PathBuf::from(format!("{}{MAP_SUFFIX}", path.display()));
                let map_json = map.to_json();
                if fs::read_to_string(&map_path).ok().as_deref() != Some(map_json.as_str()) {
                    fs::write(&map_path, map_json)?;
                }
            }

            if fs::read_to_string(&path).ok().as_deref() == Some(content.as_str()) {
                continue;
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
            written.push(asset.name);
        }

        Ok(written)
    }
}
