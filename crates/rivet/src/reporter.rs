use crate::host::Asset;
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Serialize)]
pub struct AssetStat {
    pub name: String,
    pub size: usize,
    pub minimized: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub assets: Vec<AssetStat>,
    pub total_assets: usize,
    pub minimized_count: usize,
    pub warnings: Vec<String>,
    /// Whether the `[minimized]` flag is shown in text output
    #[serde(skip)]
    pub annotate: bool,
}

impl Report {
    pub fn new(assets: &[Asset], annotate: bool) -> Self {
        let assets: Vec<AssetStat> = assets
            .iter()
            .map(|asset| AssetStat {
                name: asset.name.clone(),
                size: asset.source.len(),
                minimized: asset.info.minimized,
            })
            .collect();
        let minimized_count = assets.iter().filter(|asset| asset.minimized).count();

        Self { total_assets: assets.len(), assets, minimized_count, warnings: Vec::new(), annotate }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Render the stats table
pub fn format_text(report: &Report) -> String {
    let mut out = String::new();
    if report.assets.is_empty() {
        out.push_str("No assets found.\n");
        return out;
    }

    let width = report.assets.iter().map(|asset| asset.name.len()).max().unwrap_or(0);
    for asset in &report.assets {
        let flag = if report.annotate && asset.minimized { " [minimized]" } else { "" };
        let _ = writeln!(out, "  {:<width$}  {:>8} B{flag}", asset.name, asset.size);
    }
    let _ = writeln!(out, "\n{}/{} assets minimized", report.minimized_count, report.total_assets);

    for warning in &report.warnings {
        let _ = writeln!(out, "Warning: {warning}");
    }
    out
}

pub fn report_text(report: &Report) {
    print!("{}", format_text(report));
}

pub fn report_json(report: &Report) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::AssetInfo;

    fn asset(name: &str, source: &str, minimized: bool) -> Asset {
        Asset {
            name: name.to_string(),
            source: source.to_string(),
            map: None,
            info: AssetInfo { minimized, ..Default::default() },
        }
    }

    #[test]
    fn test_minimized_flag_in_text() {
        let report = Report::new(&[asset("main.js", "a()", true), asset("main.js.map", "{}", false)], true);
        let text = format_text(&report);

        assert!(text.contains(&format!("  {:<11}  {:>8} B [minimized]", "main.js", 3)));
        assert!(!text.lines().any(|line| line.contains("main.js.map") && line.contains("[minimized]")));
        assert!(text.contains("1/2 assets minimized"));
    }

    #[test]
    fn test_no_flag_without_annotation() {
        let report = Report::new(&[asset("main.js", "a()", true)], false);
        assert!(!format_text(&report).contains("[minimized]"));
        assert_eq!(report.minimized_count, 1);
    }

    #[test]
    fn test_json_shape() {
        let report = Report::new(&[asset("a.js", "x", true)], true).with_warnings(vec!["w".into()]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["totalAssets"], 1);
        assert_eq!(value["minimizedCount"], 1);
        assert_eq!(value["assets"][0]["minimized"], true);
        assert_eq!(value["warnings"][0], "w");
        assert!(value.get("annotate").is_none());
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(format_text(&Report::new(&[], true)), "No assets found.\n");
    }
}
