//! The bundler-side contract the minify pass runs against.

use crate::filter::AssetRef;
use crate::sourcemap::SourceMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Metadata the host keeps per asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    #[serde(default)]
    pub minimized: bool,
    /// Fields owned by the host or other plugins, never dropped
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetInfo {
    /// Copy of `self` with `minimized` set
    pub fn minimized(&self) -> Self {
        Self { minimized: true, extra: self.extra.clone() }
    }

    /// Apply an update on top of the current fields
    pub fn merge(&mut self, update: AssetInfo) {
        self.minimized = update.minimized;
        self.extra.extend(update.extra);
    }
}

/// Content of an asset, with its map when one was requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSource {
    pub source: String,
    pub map: Option<SourceMap>,
}

/// Snapshot of one asset
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    pub source: String,
    pub map: Option<SourceMap>,
    pub info: AssetInfo,
}

/// A chunk and the output files it produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub name: Option<String>,
    pub files: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Asset not found: {0}")]
    MissingAsset(String),

    #[error("Asset already exists: {0}")]
    AssetExists(String),
}

/// One build's asset store, as exposed by the host.
///
/// Methods take `&self`; implementations synchronize internally so the minify
/// pass can read assets from concurrent transforms.
pub trait Compilation: Send + Sync {
    /// Whether the host offers the staged asset-processing hook (newer API)
    fn supports_process_assets(&self) -> bool;

    /// Every asset name, in the host's enumeration order
    fn asset_names(&self) -> Vec<String>;

    fn chunks(&self) -> Vec<Chunk>;

    fn asset_info(&self, name: &str) -> Option<AssetInfo>;

    fn read_asset(&self, name: &str, include_map: bool) -> Result<AssetSource, HostError>;

    /// Replace content and map; `info` is merged into the existing metadata
    fn update_asset(&self, name: &str, source: AssetSource, info: AssetInfo) -> Result<(), HostError>;

    fn emit_asset(&self, name: &str, content: String, info: AssetInfo) -> Result<(), HostError>;

    /// The configured devtool string, e.g. `source-map`
    fn devtool(&self) -> Option<String>;

    /// Contribute data to the build's content hash
    fn update_hash(&self, data: &str);

    fn is_watching(&self) -> bool;

    /// Record a non-fatal diagnostic
    fn warn(&self, message: String);
}

/// The two asset-processing API generations a host may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostApi {
    /// Staged processing over every asset, with stats annotations
    ProcessAssets,
    /// Legacy optimization over the files of each chunk
    ChunkAssets,
}

impl HostApi {
    pub fn detect(compilation: &dyn Compilation) -> Self {
        if compilation.supports_process_assets() { Self::ProcessAssets } else { Self::ChunkAssets }
    }

    /// Assets offered to the pass, in enumeration order
    pub fn candidate_assets(self, compilation: &dyn Compilation) -> Vec<AssetRef> {
        let names = match self {
            Self::ProcessAssets => compilation.asset_names(),
            Self::ChunkAssets => {
                let mut seen = FxHashSet::default();
                compilation
                    .chunks()
                    .into_iter()
                    .flat_map(|chunk| chunk.files)
                    .filter(|file| seen.insert(file.clone()))
                    .collect()
            }
        };

        names
            .into_iter()
            .filter_map(|name| {
                let info = compilation.asset_info(&name)?;
                Some(AssetRef { name, info })
            })
            .collect()
    }

    /// Only the newer API can flag minimized assets in printed stats
    pub fn annotates_stats(self) -> bool {
        self == Self::ProcessAssets
    }
}

/// Snapshot every asset of a compilation, in enumeration order
pub fn snapshot_assets(compilation: &dyn Compilation) -> Result<Vec<Asset>, HostError> {
    compilation
        .asset_names()
        .into_iter()
        .map(|name| {
            let AssetSource { source, map } = compilation.read_asset(&name, true)?;
            let info = compilation.asset_info(&name).unwrap_or_default();
            Ok(Asset { name, source, map, info })
        })
        .collect()
}

struct StoredAsset {
    source: String,
    map: Option<SourceMap>,
    info: AssetInfo,
}

#[derive(Default)]
struct MemoryState {
    order: Vec<String>,
    assets: FxHashMap<String, StoredAsset>,
    chunks: Vec<Chunk>,
    hash: Sha256,
    warnings: Vec<String>,
}

/// In-memory `Compilation`, used by the CLI and the JS bindings
pub struct MemoryCompilation {
    state: RwLock<MemoryState>,
    devtool: Option<String>,
    process_assets: bool,
    watching: bool,
}

impl MemoryCompilation {
    pub fn new() -> Self {
        Self { state: RwLock::new(MemoryState::default()), devtool: None, process_assets: true, watching: false }
    }

    pub fn with_devtool(mut self, devtool: impl Into<String>) -> Self {
        self.devtool = Some(devtool.into());
        self
    }

    /// Expose only the legacy chunk-based API
    pub fn legacy(mut self) -> Self {
        self.process_assets = false;
        self
    }

    pub fn watching(mut self, watching: bool) -> Self {
        self.watching = watching;
        self
    }

    /// Add an asset, replacing any previous one with the same name
    pub fn insert_asset(&self, name: impl Into<String>, source: impl Into<String>, map: Option<SourceMap>, info: AssetInfo) {
        let name = name.into();
        let mut state = self.state.write();
        if !state.assets.contains_key(&name) {
            state.order.push(name.clone());
        }
        state.assets.insert(name, StoredAsset { source: source.into(), map, info });
    }

    pub fn add_chunk(&self, chunk: Chunk) {
        self.state.write().chunks.push(chunk);
    }

    pub fn asset(&self, name: &str) -> Option<Asset> {
        let state = self.state.read();
        state.assets.get(name).map(|stored| Asset {
            name: name.to_string(),
            source: stored.source.clone(),
            map: stored.map.clone(),
            info: stored.info.clone(),
        })
    }

    /// Every asset, in insertion order
    pub fn assets(&self) -> Vec<Asset> {
        let names = self.state.read().order.clone();
        names.iter().filter_map(|name| self.asset(name)).collect()
    }

    /// Hex digest of everything contributed through `update_hash`
    pub fn hash_digest(&self) -> String {
        let digest = self.state.read().hash.clone().finalize();
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.state.read().warnings.clone()
    }
}

impl Default for MemoryCompilation {
    fn default() -> Self {
        Self::new()
    }
}

impl Compilation for MemoryCompilation {
    fn supports_process_assets(&self) -> bool {
        self.process_assets
    }

    fn asset_names(&self) -> Vec<String> {
        self.state.read().order.clone()
    }

    fn chunks(&self) -> Vec<Chunk> {
        self.state.read().chunks.clone()
    }

    fn asset_info(&self, name: &str) -> Option<AssetInfo> {
        self.state.read().assets.get(name).map(|stored| stored.info.clone())
    }

    fn read_asset(&self, name: &str, include_map: bool) -> Result<AssetSource, HostError> {
        let state = self.state.read();
        let stored = state.assets.get(name).ok_or_else(|| HostError::MissingAsset(name.to_string()))?;
        Ok(AssetSource {
            source: stored.source.clone(),
            map: if include_map { stored.map.clone() } else { None },
        })
    }

    fn update_asset(&self, name: &str, source: AssetSource, info: AssetInfo) -> Result<(), HostError> {
        let mut state = self.state.write();
        let stored = state.assets.get_mut(name).ok_or_else(|| HostError::MissingAsset(name.to_string()))?;
        stored.source = source.source;
        stored.map = source.map;
        stored.info.merge(info);
        Ok(())
    }

    fn emit_asset(&self, name: &str, content: String, info: AssetInfo) -> Result<(), HostError> {
        let mut state = self.state.write();
        if state.assets.contains_key(name) {
            return Err(HostError::AssetExists(name.to_string()));
        }
        state.order.push(name.to_string());
        state.assets.insert(name.to_string(), StoredAsset { source: content, map: None, info });
        Ok(())
    }

    fn devtool(&self) -> Option<String> {
        self.devtool.clone()
    }

    fn update_hash(&self, data: &str) {
        self.state.write().hash.update(data.as_bytes());
    }

    fn is_watching(&self) -> bool {
        self.watching
    }

    fn warn(&self, message: String) {
        self.state.write().warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info_with(key: &str, value: Value) -> AssetInfo {
        let mut info = AssetInfo::default();
        info.extra.insert(key.to_string(), value);
        info
    }

    #[test]
    fn test_update_merges_info() {
        let compilation = MemoryCompilation::new();
        compilation.insert_asset("a.js", "a()", None, info_with("contenthash", json!("abc")));

        let info = compilation.asset_info("a.js").unwrap().minimized();
        compilation
            .update_asset("a.js", AssetSource { source: "b()".into(), map: None }, info)
            .unwrap();

        let asset = compilation.asset("a.js").unwrap();
        assert_eq!(asset.source, "b()");
        assert!(asset.info.minimized);
        assert_eq!(asset.info.extra["contenthash"], "abc");
    }

    #[test]
    fn test_missing_and_duplicate_assets() {
        let compilation = MemoryCompilation::new();
        assert_eq!(compilation.read_asset("x.js", false), Err(HostError::MissingAsset("x.js".into())));

        compilation.emit_asset("x.js", "x".into(), AssetInfo::default()).unwrap();
        assert_eq!(
            compilation.emit_asset("x.js", "y".into(), AssetInfo::default()),
            Err(HostError::AssetExists("x.js".into()))
        );
    }

    #[test]
    fn test_read_asset_map_on_request() {
        let compilation = MemoryCompilation::new();
        let map = SourceMap::from_json(r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA"}"#).unwrap();
        compilation.insert_asset("a.js", "a()", Some(map), AssetInfo::default());

        assert!(compilation.read_asset("a.js", false).unwrap().map.is_none());
        assert!(compilation.read_asset("a.js", true).unwrap().map.is_some());
    }

    #[test]
    fn test_detect_host_api() {
        let modern = MemoryCompilation::new();
        let legacy = MemoryCompilation::new().legacy();
        assert_eq!(HostApi::detect(&modern), HostApi::ProcessAssets);
        assert_eq!(HostApi::detect(&legacy), HostApi::ChunkAssets);
        assert!(HostApi::ProcessAssets.annotates_stats());
        assert!(!HostApi::ChunkAssets.annotates_stats());
    }

    #[test]
    fn test_candidate_assets_by_api() {
        let compilation = MemoryCompilation::new().legacy();
        for name in ["main.js", "vendor.js", "style.css", "orphan.js"] {
            compilation.insert_asset(name, "", None, AssetInfo::default());
        }
        compilation.add_chunk(Chunk { name: Some("main".into()), files: vec!["main.js".into(), "style.css".into()] });
        compilation.add_chunk(Chunk { name: None, files: vec!["vendor.js".into(), "main.js".into()] });

        let chunk_files: Vec<_> = HostApi::ChunkAssets
            .candidate_assets(&compilation)
            .into_iter()
            .map(|asset| asset.name)
            .collect();
        assert_eq!(chunk_files, ["main.js", "style.css", "vendor.js"]);

        let all = HostApi::ProcessAssets.candidate_assets(&compilation);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_snapshot_assets_in_order() {
        let compilation = MemoryCompilation::new();
        compilation.insert_asset("b.js", "b", None, AssetInfo::default());
        compilation.insert_asset("a.js", "a", None, info_with("size", json!(1)));

        let assets = snapshot_assets(&compilation).unwrap();
        assert_eq!(assets, compilation.assets());
        assert_eq!(assets[0].name, "b.js");
        assert_eq!(assets[1].info.extra["size"], 1);
    }

    #[test]
    fn test_hash_digest_changes() {
        let compilation = MemoryCompilation::new();
        let empty = compilation.hash_digest();
        assert_eq!(empty.len(), 64);
        compilation.update_hash("rivet");
        assert_ne!(compilation.hash_digest(), empty);
    }
}
