//! Source maps attached to assets and transform output.
//!
//! Transforms that run over output which was itself produced by an earlier
//! stage carry two maps: final -> intermediate (from the transform) and
//! intermediate -> original (attached to the asset). [`SourceMap::chain`]
//! composes them so the final output resolves straight back to the original.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sourcemap::{SourceMapBuilder, Token};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceMapError {
    #[error("Invalid source map: {0}")]
    Decode(#[from] sourcemap::Error),
}

/// Resolved original position, as returned by [`SourceMap::lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition<'a> {
    pub source: &'a str,
    /// 0-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
    pub name: Option<&'a str>,
}

/// A decoded v3 source map
#[derive(Clone)]
pub struct SourceMap(sourcemap::SourceMap);

impl SourceMap {
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        Ok(Self(sourcemap::SourceMap::from_slice(json.as_bytes())?))
    }

    pub fn to_json(&self) -> String {
        let mut out = Vec::new();
        self.0
            .to_writer(&mut out)
            .map(|()| String::from_utf8_lossy(&out).into_owned())
            .unwrap_or_default()
    }

    /// `//# sourceMappingURL=` comment embedding the map as a data URL
    pub fn to_inline_comment(&self) -> String {
        format!(
            "//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
            STANDARD.encode(self.to_json())
        )
    }

    pub fn sources(&self) -> Vec<&str> {
        self.0.sources().collect()
    }

    /// Find the original position for a generated (0-based) line and column.
    /// The closest mapping at or before `column` on that same line wins.
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition<'_>> {
        let token = same_line_token(&self.0, line, column)?;
        Some(OriginalPosition {
            source: token.get_source()?,
            line: token.get_src_line(),
            column: token.get_src_col(),
            name: token.get_name(),
        })
    }

    /// Compose `self` (final -> intermediate) with `previous` (intermediate ->
    /// original). Mappings whose intermediate position has no counterpart in
    /// `previous` are kept as unmapped generated positions.
    pub fn chain(&self, previous: &SourceMap) -> SourceMap {
        let mut builder = SourceMapBuilder::new(self.0.get_file());
        builder.set_source_root(previous.0.get_source_root());

        for token in self.0.tokens() {
            let resolved = if token.has_source() {
                same_line_token(&previous.0, token.get_src_line(), token.get_src_col())
            } else {
                None
            };

            let Some((original, source)) = resolved.and_then(|o| o.get_source().map(|s| (o, s))) else {
                builder.add_raw(token.get_dst_line(), token.get_dst_col(), 0, 0, None, None, false);
                continue;
            };

            let source_id = builder.add_source(source);
            if let Some(contents) = previous.0.get_source_contents(original.get_src_id()) {
                builder.set_source_contents(source_id, Some(contents));
            }
            let name_id = token.get_name().or_else(|| original.get_name()).map(|name| builder.add_name(name));

            builder.add_raw(
                token.get_dst_line(),
                token.get_dst_col(),
                original.get_src_line(),
                original.get_src_col(),
                Some(source_id),
                name_id,
                false,
            );
        }

        SourceMap(builder.into_sourcemap())
    }
}

fn same_line_token(map: &sourcemap::SourceMap, line: u32, column: u32) -> Option<Token<'_>> {
    map.lookup_token(line, column).filter(|token| token.get_dst_line() == line)
}

impl fmt::Debug for SourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceMap").field(&self.to_json()).finish()
    }
}

impl PartialEq for SourceMap {
    fn eq(&self, other: &Self) -> bool {
        self.to_json() == other.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_mappings() {
        // A run of continuation digits overflows any integer
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"ggggggggggggggggA"}"#;
        assert!(matches!(SourceMap::from_json(json), Err(SourceMapError::Decode(_))));

        assert!(SourceMap::from_json("not json").is_err());
        assert!(SourceMap::from_json(r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"A!"}"#).is_err());
    }

    #[test]
    fn test_lookup_picks_closest_preceding_mapping() {
        let source_map =
            SourceMap::from_json(r#"{"version":3,"sources":["a.js"],"names":["foo"],"mappings":"AAAA,IAAIA"}"#)
                .unwrap();
        let first = source_map.lookup(0, 2).unwrap();
        assert_eq!((first.line, first.column, first.name), (0, 0, None));

        let second = source_map.lookup(0, 9).unwrap();
        assert_eq!((second.column, second.name), (4, Some("foo")));

        assert!(source_map.lookup(3, 0).is_none());
    }

    #[test]
    fn test_chain_resolves_through_both_stages() {
        // Intermediate line 10 col 4 came from original line 2 (the third line) col 2
        let mut inner = SourceMapBuilder::new(None);
        let src = inner.add_source("webpack:///src/index.js");
        inner.set_source_contents(src, Some("a\nb\n  console.log(1)\n"));
        inner.add_raw(10, 4, 2, 2, Some(src), None, false);
        let inner = SourceMap(inner.into_sourcemap());

        // Final line 0 col 5 came from intermediate line 10 col 4
        let mut outer = SourceMapBuilder::new(Some("index.js"));
        let mid = outer.add_source("index.js");
        outer.add_raw(0, 5, 10, 4, Some(mid), None, false);
        let outer = SourceMap(outer.into_sourcemap());

        let chained = outer.chain(&inner);
        let position = chained.lookup(0, 5).unwrap();
        assert_eq!(position.source, "webpack:///src/index.js");
        assert_eq!(position.line, 2);
        assert!(chained.to_json().contains("console.log(1)"));
    }

    #[test]
    fn test_chain_drops_unresolvable_positions() {
        let inner = SourceMap::from_json(r#"{"version":3,"sources":["src.js"],"names":[],"mappings":"AAAA"}"#).unwrap();
        let outer = SourceMap::from_json(r#"{"version":3,"sources":["mid.js"],"names":[],"mappings":"AAKA"}"#).unwrap();
        let chained = outer.chain(&inner);
        assert!(chained.lookup(0, 0).is_none());
        assert!(chained.sources().is_empty());
    }

    #[test]
    fn test_json_roundtrip_keeps_sources_content() {
        let json = r#"{"version":3,"sources":["a.js"],"sourcesContent":["x"],"names":[],"mappings":"AAAA"}"#;
        let source_map = SourceMap::from_json(json).unwrap();
        assert_eq!(source_map.sources(), ["a.js"]);
        assert!(source_map.to_json().contains("\"sourcesContent\""));
        assert_eq!(SourceMap::from_json(&source_map.to_json()).unwrap(), source_map);
        assert!(source_map.to_inline_comment().starts_with("//# sourceMappingURL=data:"));
    }
}
