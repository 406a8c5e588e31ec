use clap::Parser;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use rivet::cli::{Cli, Command, OutputFormat};
use rivet::reporter::{report_json, report_text};
use rivet::{FileConfig, RivetPlugin, minify_directory, transform_path};

/// Config file names looked up in the working directory, in priority order
const CONFIG_NAMES: [&str; 2] = ["rivet.json", "rivet.jsonc"];

/// Read a (possibly commented) config file
fn read_config(path: &Path) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let mut content = fs::read_to_string(path)?;
    json_strip_comments::strip(&mut content)?;
    Ok(serde_json::from_str(&content)?)
}

/// Resolve the effective config. An explicit `--config` must exist and parse;
/// the first discovered default file is only warned about when broken.
fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<FileConfig, Box<dyn std::error::Error>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()).into());
        }
        return read_config(path);
    }

    for path in CONFIG_NAMES.iter().map(|name| cwd.join(name)) {
        if !path.exists() {
            continue;
        }
        return Ok(read_config(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse config file '{}': {e}", path.display());
            FileConfig::default()
        }));
    }
    Ok(FileConfig::default())
}

fn init_tracing(verbose: bool) {
    // `RIVET_LOG` wins unless --verbose was given
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("RIVET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file_config = match resolve_config(cli.config.as_deref(), &cli.cwd) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let cwd = cli.cwd.canonicalize()?;

    match cli.command {
        Command::Transform(args) => {
            let options = args.apply(file_config.loader);
            let plugin = RivetPlugin::with_builtins(&cwd)?;
            let output = match transform_path(&plugin, &cwd.join(&args.file), options).await {
                Ok(output) => output,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };

            for warning in &output.warnings {
                eprintln!("Warning: {warning}");
            }
            match cli.format {
                OutputFormat::Text => print!("{}", output.code),
                OutputFormat::Json => {
                    let value = serde_json::json!({
                        "code": output.code,
                        "map": output.map.map(|map| map.to_json()),
                        "warnings": output.warnings,
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        Command::Minify(args) => {
            let options = args.apply(file_config.minify)?;
            let plugin = RivetPlugin::with_builtins(&cwd)?;
            let report = match minify_directory(&plugin, &cwd.join(&args.dir), options).await {
                Ok(report) => report,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };

            match cli.format {
                OutputFormat::Text => report_text(&report),
                OutputFormat::Json => report_json(&report)?,
            }
        }
    }

    Ok(())
}
