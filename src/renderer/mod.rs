pub mod params;
pub mod quarto;

pub use quarto::QuartoRenderer;

use crate::config::RenderConfig;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `--output` value that makes quarto write the document to its stdout.
pub const STDOUT_OUTPUT: &str = "-";

/// Something that turns a source document into a target format.
///
/// Implementations receive the document name and format exactly as the
/// caller gave them and resolve the document relative to the current
/// working directory.
pub trait Renderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutcome>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutcome> {
        (**self).render(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub input: String,
    pub output_format: String,
    pub options: RenderOptions,
}

/// Optional renderer flags. The default passes nothing beyond input and format.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub output_file: Option<String>,
    pub execute: bool,
    pub execute_params: BTreeMap<String, serde_json::Value>,
    pub execute_dir: Option<PathBuf>,
    pub cache: Option<bool>,
    pub cache_refresh: bool,
    pub kernel_keepalive: Option<u32>,
    pub kernel_restart: bool,
    pub debug: bool,
    pub quiet: bool,
    pub metadata: BTreeMap<String, String>,
    pub pandoc_args: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output_file: None,
            execute: true,
            execute_params: BTreeMap::new(),
            execute_dir: None,
            cache: None,
            cache_refresh: false,
            kernel_keepalive: None,
            kernel_restart: false,
            debug: false,
            quiet: false,
            metadata: BTreeMap::new(),
            pandoc_args: Vec::new(),
        }
    }
}

impl From<&RenderConfig> for RenderOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            output_file: config.output_file.clone(),
            execute: config.execute,
            execute_params: config.params.clone(),
            execute_dir: config.execute_dir.clone(),
            cache: config.cache,
            cache_refresh: config.cache_refresh,
            kernel_keepalive: config.kernel_keepalive,
            kernel_restart: config.kernel_restart,
            debug: config.debug,
            quiet: config.quiet,
            metadata: config.metadata.clone(),
            pandoc_args: config.pandoc_args.clone(),
        }
    }
}

impl RenderOptions {
    pub fn writes_to_stdout(&self) -> bool {
        self.output_file.as_deref() == Some(STDOUT_OUTPUT)
    }
}

impl RenderRequest {
    pub fn new<I: Into<String>, F: Into<String>>(input: I, output_format: F) -> Self {
        Self {
            input: input.into(),
            output_format: output_format.into(),
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Where the rendered file is expected to land, relative to the working
    /// directory. `None` when the format has no well-known extension or the
    /// document goes to stdout.
    pub fn expected_output_path(&self) -> Option<PathBuf> {
        if self.options.writes_to_stdout() {
            return None;
        }
        if let Some(ref output_file) = self.options.output_file {
            return Some(PathBuf::from(output_file));
        }

        let extension = extension_for_format(&self.output_format)?;
        Some(Path::new(&self.input).with_extension(extension))
    }
}

/// File extension Quarto uses for a format, ignoring `+ext`/`-ext` modifiers.
pub fn extension_for_format(format: &str) -> Option<&'static str> {
    let base = format
        .split(|c| c == '+' || c == '-')
        .next()
        .unwrap_or(format)
        .to_lowercase();

    match base.as_str() {
        "html" | "html4" | "html5" | "revealjs" | "dashboard" => Some("html"),
        "pdf" | "beamer" | "typst" => Some("pdf"),
        "docx" => Some("docx"),
        "odt" => Some("odt"),
        "epub" => Some("epub"),
        "pptx" => Some("pptx"),
        "gfm" | "commonmark" | "markdown" | "hugo" | "docusaurus" => Some("md"),
        "latex" => Some("tex"),
        "ipynb" => Some("ipynb"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub output_path: Option<PathBuf>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_format() {
        assert_eq!(extension_for_format("html"), Some("html"));
        assert_eq!(extension_for_format("HTML"), Some("html"));
        assert_eq!(extension_for_format("revealjs"), Some("html"));
        assert_eq!(extension_for_format("gfm-yaml_metadata_block"), Some("md"));
        assert_eq!(extension_for_format("docx+native_numbering"), Some("docx"));
        assert_eq!(extension_for_format("my-custom-format"), None);
    }

    #[test]
    fn test_expected_output_path() {
        let request = RenderRequest::new("linear_equations.qmd", "html");
        assert_eq!(
            request.expected_output_path(),
            Some(PathBuf::from("linear_equations.html"))
        );

        let request = RenderRequest::new("notes.qmd", "unknown");
        assert_eq!(request.expected_output_path(), None);

        let options = RenderOptions {
            output_file: Some("out/index.html".to_string()),
            ..RenderOptions::default()
        };
        let request = RenderRequest::new("notes.qmd", "unknown").with_options(options);
        assert_eq!(
            request.expected_output_path(),
            Some(PathBuf::from("out/index.html"))
        );
    }

    #[test]
    fn test_stdout_output_has_no_path() {
        let options = RenderOptions {
            output_file: Some(STDOUT_OUTPUT.to_string()),
            ..RenderOptions::default()
        };
        assert!(options.writes_to_stdout());
        assert!(!RenderOptions::default().writes_to_stdout());

        let request = RenderRequest::new("linear_equations.qmd", "html").with_options(options);
        assert_eq!(request.expected_output_path(), None);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = RenderConfig::default();
        config.execute = false;
        config.cache = Some(true);
        config.pandoc_args = vec!["--toc".to_string()];

        let options = RenderOptions::from(&config);
        assert!(!options.execute);
        assert_eq!(options.cache, Some(true));
        assert_eq!(options.pandoc_args, vec!["--toc"]);
        assert_eq!(RenderOptions::from(&RenderConfig::default()), RenderOptions::default());
    }
}
