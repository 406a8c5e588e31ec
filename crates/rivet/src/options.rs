use crate::filter::{Filter, FilterCriteria, one_or_many};
use crate::types::{Dialect, LegalComments, MinifyFlags, SourceMapMode, Target};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Options for the per-file loader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderOptions {
    /// Compile-down target [default: es2015]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    /// Explicit source dialect [default: inferred from the file extension]
    #[serde(default, alias = "dialect", skip_serializing_if = "Option::is_none")]
    pub loader: Option<Dialect>,

    /// Pin configuration resolution to this tsconfig file
    #[serde(default, alias = "tsconfigPath", skip_serializing_if = "Option::is_none")]
    pub tsconfig: Option<PathBuf>,

    /// Override the host's source map setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcemap: Option<SourceMapMode>,

    /// Name of a registered transform implementation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,

    /// Everything else is forwarded to the transform
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Options for the minify pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinifyOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,

    /// Dialect for script assets [default: js]
    #[serde(default, alias = "dialect", skip_serializing_if = "Option::is_none")]
    pub loader: Option<Dialect>,

    /// Override source map detection from the host's devtool setting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcemap: Option<bool>,

    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<Filter>,

    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<Filter>,

    /// Also minify style assets
    #[serde(default)]
    pub css: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_comments: Option<LegalComments>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify_whitespace: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify_identifiers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify_syntax: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MinifyOptions {
    /// Turn on full minification when no `minify*` flag was given
    pub fn normalized(mut self) -> Self {
        let any_flag = self.minify.is_some()
            || self.minify_whitespace.is_some()
            || self.minify_identifiers.is_some()
            || self.minify_syntax.is_some();
        if !any_flag {
            self.minify = Some(true);
        }
        self
    }

    pub fn minify_flags(&self) -> MinifyFlags {
        let all = self.minify.unwrap_or(false);
        MinifyFlags {
            whitespace: self.minify_whitespace.unwrap_or(all),
            identifiers: self.minify_identifiers.unwrap_or(all),
            syntax: self.minify_syntax.unwrap_or(all),
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria::new(self.include.clone(), self.exclude.clone())
    }
}

/// Contents of a `rivet.json` / `rivet.jsonc` file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub loader: LoaderOptions,

    #[serde(default)]
    pub minify: MinifyOptions,
}

/// Merge option layers from lowest to highest precedence: defaults, then
/// configuration-derived options, then the request's own options. Nested
/// objects merge key by key, anything else is replaced.
pub fn merge_layers(
    defaults: &Map<String, Value>,
    config: &Map<String, Value>,
    request: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for layer in [config, request] {
        deep_merge(&mut merged, layer);
    }
    merged
}

fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Read the `minify*` flags out of a free-form option map
pub(crate) fn minify_flags_from(map: &Map<String, Value>) -> MinifyFlags {
    let flag = |key: &str| map.get(key).and_then(Value::as_bool);
    let all = flag("minify").unwrap_or(false);
    MinifyFlags {
        whitespace: flag("minifyWhitespace").unwrap_or(all),
        identifiers: flag("minifyIdentifiers").unwrap_or(all),
        syntax: flag("minifySyntax").unwrap_or(all),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_merge_precedence_request_over_config_over_defaults() {
        let defaults = object(json!({ "charset": "ascii", "keepNames": false }));
        let config = object(json!({ "keepNames": true, "tsconfigRaw": { "compilerOptions": { "strict": true, "jsx": "react" } } }));
        let request = object(json!({ "charset": "utf8", "tsconfigRaw": { "compilerOptions": { "jsx": "preserve" } } }));

        let merged = merge_layers(&defaults, &config, &request);
        assert_eq!(merged["charset"], "utf8");
        assert_eq!(merged["keepNames"], true);
        assert_eq!(merged["tsconfigRaw"]["compilerOptions"]["strict"], true);
        assert_eq!(merged["tsconfigRaw"]["compilerOptions"]["jsx"], "preserve");
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        let defaults = object(json!({ "drop": ["console"] }));
        let request = object(json!({ "drop": ["debugger"] }));
        let merged = merge_layers(&defaults, &Map::new(), &request);
        assert_eq!(merged["drop"], json!(["debugger"]));
    }

    #[test]
    fn test_minify_defaults_to_everything() {
        let options = MinifyOptions::default().normalized();
        assert_eq!(options.minify, Some(true));
        assert_eq!(options.minify_flags(), MinifyFlags::all());
    }

    #[test]
    fn test_single_minify_flag_disables_defaults() {
        let options =
            MinifyOptions { minify_whitespace: Some(true), ..Default::default() }.normalized();
        assert_eq!(options.minify, None);
        assert_eq!(
            options.minify_flags(),
            MinifyFlags { whitespace: true, identifiers: false, syntax: false }
        );
    }

    #[test]
    fn test_minify_options_from_json() {
        let options: MinifyOptions = serde_json::from_str(
            r#"{ "include": "/(index|bar)/", "exclude": ["vendor"], "css": true, "legalComments": "external", "keepNames": true }"#,
        )
        .unwrap();
        assert_eq!(options.include.len(), 1);
        assert_eq!(options.exclude.len(), 1);
        assert!(options.css);
        assert_eq!(options.legal_comments, Some(LegalComments::External));
        assert_eq!(options.extra["keepNames"], true);
    }

    #[test]
    fn test_file_config_sections() {
        let config: FileConfig = serde_json::from_str(
            r#"{ "loader": { "target": ["es2020", "chrome90"] }, "minify": { "css": true } }"#,
        )
        .unwrap();
        assert_eq!(config.loader.target, Some(Target::new(["es2020", "chrome90"])));
        assert!(config.minify.css);

        let empty: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(empty.loader.target.is_none());
    }

    #[test]
    fn test_loader_options_aliases() {
        let options: LoaderOptions = serde_json::from_str(
            r#"{ "dialect": "tsx", "tsconfigPath": "./tsconfig.build.json", "target": "es2020", "minify": true }"#,
        )
        .unwrap();
        assert_eq!(options.loader, Some(Dialect::Tsx));
        assert_eq!(options.tsconfig, Some(PathBuf::from("./tsconfig.build.json")));
        assert_eq!(options.extra["minify"], true);
        assert!(minify_flags_from(&options.extra).any());
    }
}
