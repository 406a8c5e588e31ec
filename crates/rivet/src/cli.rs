use crate::filter::Filter;
use crate::options::{LoaderOptions, MinifyOptions};
use crate::types::{Dialect, LegalComments, RivetError, SourceMapMode, Target};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rivet")]
#[command(about = "Transform and minify JavaScript/TypeScript the way a bundler integration does")]
pub struct Cli {
    /// Path to config file (rivet.json or rivet.jsonc)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(short = 'C', long, default_value = ".", global = true)]
    pub cwd: PathBuf,

    /// Output format
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Log debug output (overrides RIVET_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Transform one source file and print the result
    Transform(TransformArgs),

    /// Minify the assets of a build output directory in place
    Minify(MinifyArgs),
}

#[derive(Args)]
pub struct TransformArgs {
    /// Source file to transform
    pub file: PathBuf,

    /// Compile-down target, comma separated [default: es2015]
    #[arg(long)]
    pub target: Option<String>,

    /// Source dialect [default: inferred from the extension]
    #[arg(long)]
    pub loader: Option<Dialect>,

    /// Use this tsconfig instead of the nearest one
    #[arg(long)]
    pub tsconfig: Option<PathBuf>,

    /// Source map output
    #[arg(long)]
    pub sourcemap: Option<SourceMapMode>,

    /// Registered transform implementation [default: oxc]
    #[arg(long)]
    pub implementation: Option<String>,
}

impl TransformArgs {
    /// Flags override the config file's loader section
    pub fn apply(&self, mut options: LoaderOptions) -> LoaderOptions {
        if let Some(target) = &self.target {
            options.target = Some(parse_target(target));
        }
        if self.loader.is_some() {
            options.loader = self.loader;
        }
        if self.tsconfig.is_some() {
            options.tsconfig = self.tsconfig.clone();
        }
        if self.sourcemap.is_some() {
            options.sourcemap = self.sourcemap;
        }
        if self.implementation.is_some() {
            options.implementation = self.implementation.clone();
        }
        options
    }
}

#[derive(Args)]
pub struct MinifyArgs {
    /// Build output directory
    pub dir: PathBuf,

    /// Compile-down target, comma separated [default: es2015]
    #[arg(long)]
    pub target: Option<String>,

    /// Only minify matching assets (`/regex/` or a name prefix)
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip matching assets (`/regex/` or a name prefix)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Also minify .css assets
    #[arg(long)]
    pub css: bool,

    #[arg(long)]
    pub legal_comments: Option<LegalComments>,

    /// Do not produce source maps even if input maps exist
    #[arg(long)]
    pub no_sourcemap: bool,

    #[arg(long)]
    pub minify_whitespace: bool,

    #[arg(long)]
    pub minify_identifiers: bool,

    #[arg(long)]
    pub minify_syntax: bool,

    /// Registered transform implementation [default: oxc]
    #[arg(long)]
    pub implementation: Option<String>,
}

impl MinifyArgs {
    /// Flags override the config file's minify section
    pub fn apply(&self, mut options: MinifyOptions) -> Result<MinifyOptions, RivetError> {
        if let Some(target) = &self.target {
            options.target = Some(parse_target(target));
        }
        if !self.include.is_empty() {
            options.include = parse_filters(&self.include)?;
        }
        if !self.exclude.is_empty() {
            options.exclude = parse_filters(&self.exclude)?;
        }
        options.css |= self.css;
        if self.legal_comments.is_some() {
            options.legal_comments = self.legal_comments;
        }
        if self.no_sourcemap {
            options.sourcemap = Some(false);
        }
        if self.minify_whitespace {
            options.minify_whitespace = Some(true);
        }
        if self.minify_identifiers {
            options.minify_identifiers = Some(true);
        }
        if self.minify_syntax {
            options.minify_syntax = Some(true);
        }
        if self.implementation.is_some() {
            options.implementation = self.implementation.clone();
        }
        Ok(options)
    }
}

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn parse_target(value: &str) -> Target {
    Target::new(value.split(',').map(str::trim).filter(|t| !t.is_empty()))
}

fn parse_filters(values: &[String]) -> Result<Vec<Filter>, RivetError> {
    values.iter().map(|value| Filter::parse(value).map_err(RivetError::from)).collect()
}
