use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::renderer::params::{parse_metadata, parse_param};
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qmdrender")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Render a Quarto document from its own folder")]
#[command(
    long_about = "qmdrender changes into the document folder and runs `quarto render` \
                  on the given file, producing HTML unless another format is requested."
)]
#[command(after_help = "EXAMPLES:\n  \
    qmdrender linear_equations.qmd --dir ~/notes/qmd\n  \
    qmdrender report.qmd --to pdf -P alpha=0.05\n  \
    qmdrender slides.qmd --to revealjs -- --toc\n  \
    qmdrender --config qmdrender.toml")]
pub struct Cli {
    /// Document to render, relative to the folder
    pub file: Option<String>,

    /// Folder to change into before rendering
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Output format passed to quarto (default: html)
    #[arg(short = 't', long = "to", value_name = "FORMAT")]
    pub to: Option<String>,

    /// Output file name
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Do not execute code cells
    #[arg(long)]
    pub no_execute: bool,

    /// Execute parameter (key=value, repeatable)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Working directory for code execution
    #[arg(long, value_name = "DIR")]
    pub execute_dir: Option<PathBuf>,

    /// Cache execution output
    #[arg(long, conflicts_with = "no_cache")]
    pub cache: bool,

    /// Do not cache execution output
    #[arg(long)]
    pub no_cache: bool,

    /// Force a refresh of the execution cache
    #[arg(long)]
    pub cache_refresh: bool,

    /// Keep the Jupyter kernel alive for this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub kernel_keepalive: Option<u32>,

    /// Restart the Jupyter kernel before rendering
    #[arg(long)]
    pub kernel_restart: bool,

    /// Leave intermediate files in place after render
    #[arg(long)]
    pub debug: bool,

    /// Document metadata (key=value, repeatable)
    #[arg(short = 'M', long = "metadata", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,

    /// Path to the quarto executable
    #[arg(long, value_name = "PATH")]
    pub quarto_path: Option<PathBuf>,

    /// Stop the render after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Format of qmdrender's own messages
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show what would be run without rendering
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a sample configuration file
    #[arg(long)]
    pub generate_config: bool,

    /// Extra arguments passed to pandoc
    #[arg(last = true, value_name = "PANDOC_ARGS")]
    pub pandoc_args: Vec<String>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum MessageFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides()?;
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> Result<CliOverrides> {
        let params = self
            .params
            .iter()
            .map(|p| parse_param(p))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let metadata = self
            .metadata
            .iter()
            .map(|m| parse_metadata(m))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let cache = match (self.cache, self.no_cache) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };

        Ok(CliOverrides::new()
            .with_folder(self.dir.clone())
            .with_file(self.file.clone())
            .with_format(self.to.clone())
            .with_output_file(self.output.clone())
            .with_no_execute(self.no_execute)
            .with_execute_dir(self.execute_dir.clone())
            .with_cache(cache)
            .with_cache_refresh(self.cache_refresh)
            .with_kernel_keepalive(self.kernel_keepalive)
            .with_kernel_restart(self.kernel_restart)
            .with_debug(self.debug)
            .with_quiet(self.quiet)
            .with_params(params)
            .with_metadata(metadata)
            .with_pandoc_args(self.pandoc_args.clone())
            .with_quarto_path(self.quarto_path.clone())
            .with_timeout(self.timeout))
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
