use crate::host::AssetInfo;
use crate::types::strip_query;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Asset name filter: a regular expression, or a plain prefix
#[derive(Debug, Clone)]
pub enum Filter {
    Prefix(String),
    Regex(Regex),
}

impl Filter {
    /// Parse a filter from its config notation. `/pattern/` and `/pattern/i`
    /// are regular expressions, anything else is a name prefix.
    pub fn parse(value: &str) -> Result<Self, regex::Error> {
        if let Some(body) = value.strip_prefix('/') {
            if let Some((pattern, flags)) = body.rsplit_once('/') {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(flags.contains('i'))
                    .build()?;
                return Ok(Self::Regex(regex));
            }
        }
        Ok(Self::Prefix(value.to_string()))
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(prefix) => f.write_str(prefix),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Filter::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Accept either a single filter or a list of them
pub(crate) fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Filter>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        One(Filter),
        Many(Vec<Filter>),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::One(filter)) => vec![filter],
        Some(Repr::Many(filters)) => filters,
        None => Vec::new(),
    })
}

/// Include/exclude patterns applied uniformly to one minify pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterCriteria {
    pub include: Vec<Filter>,
    pub exclude: Vec<Filter>,
}

impl FilterCriteria {
    pub fn new(include: Vec<Filter>, exclude: Vec<Filter>) -> Self {
        Self { include, exclude }
    }

    /// (no include OR some include matches) AND (no exclude matches)
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|f| f.matches(name));
        included && !self.exclude.iter().any(|f| f.matches(name))
    }
}

/// Kind of build output, decided by filename suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Script,
    Style,
}

impl FileType {
    pub fn classify(name: &str) -> Option<Self> {
        let name = strip_query(name).to_ascii_lowercase();
        if [".js", ".mjs", ".cjs"].iter().any(|ext| name.ends_with(ext)) {
            Some(Self::Script)
        } else if name.ends_with(".css") {
            Some(Self::Style)
        } else {
            None
        }
    }
}

/// Which file types a pass considers. Style assets are opt-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTypeRule {
    pub css: bool,
}

impl FileTypeRule {
    pub fn accepts(&self, name: &str) -> Option<FileType> {
        match FileType::classify(name)? {
            FileType::Style if !self.css => None,
            file_type => Some(file_type),
        }
    }
}

/// Name and metadata of an asset considered for a pass
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub name: String,
    pub info: AssetInfo,
}

/// Select the assets a minify pass should transform, keeping the host's order.
/// Assets already flagged `minimized` are never selected.
pub fn select_assets(
    assets: impl IntoIterator<Item = AssetRef>,
    rule: FileTypeRule,
    criteria: &FilterCriteria,
) -> Vec<AssetRef> {
    assets
        .into_iter()
        .filter(|asset| !asset.info.minimized)
        .filter(|asset| rule.accepts(&asset.name).is_some())
        .filter(|asset| criteria.matches(&asset.name))
        .collect()
}
