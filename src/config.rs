use crate::error::{QmdRenderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub document: DocumentConfig,
    pub render: RenderConfig,
    pub quarto: QuartoConfig,
}

/// Which document to render, from where, and into what.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub folder: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub format: String,
}

/// Flags forwarded to `quarto render`. Unset values are not passed at all.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub execute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execute_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    pub cache_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_keepalive: Option<u32>,
    pub kernel_restart: bool,
    pub debug: bool,
    pub quiet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    pub pandoc_args: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuartoConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Seconds; no limit when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            file: None,
            format: "html".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            execute: true,
            execute_dir: None,
            cache: None,
            cache_refresh: false,
            kernel_keepalive: None,
            kernel_restart: false,
            debug: false,
            quiet: false,
            output_file: None,
            pandoc_args: Vec::new(),
            metadata: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(QmdRenderError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QmdRenderError::Config {
                message: format!("Failed to read config file {}: {}", path.display(), e),
            })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| QmdRenderError::Config {
                message: format!("Failed to parse config file {}: {}", path.display(), e),
            })?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["qmdrender.toml", ".qmdrender.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref folder) = cli_args.folder {
            self.document.folder = folder.clone();
        }

        if let Some(ref file) = cli_args.file {
            self.document.file = Some(file.clone());
        }

        if let Some(ref format) = cli_args.format {
            self.document.format = format.clone();
        }

        if let Some(ref output_file) = cli_args.output_file {
            self.render.output_file = Some(output_file.clone());
        }

        if cli_args.no_execute {
            self.render.execute = false;
        }

        if let Some(ref execute_dir) = cli_args.execute_dir {
            self.render.execute_dir = Some(execute_dir.clone());
        }

        if let Some(cache) = cli_args.cache {
            self.render.cache = Some(cache);
        }

        if cli_args.cache_refresh {
            self.render.cache_refresh = true;
        }

        if let Some(keepalive) = cli_args.kernel_keepalive {
            self.render.kernel_keepalive = Some(keepalive);
        }

        if cli_args.kernel_restart {
            self.render.kernel_restart = true;
        }

        if cli_args.debug {
            self.render.debug = true;
        }

        if cli_args.quiet {
            self.render.quiet = true;
        }

        self.render.params.extend(cli_args.params.clone());
        self.render.metadata.extend(cli_args.metadata.clone());

        if !cli_args.pandoc_args.is_empty() {
            self.render.pandoc_args = cli_args.pandoc_args.clone();
        }

        if let Some(ref path) = cli_args.quarto_path {
            self.quarto.path = Some(path.clone());
        }

        if let Some(timeout) = cli_args.timeout {
            self.quarto.timeout = Some(timeout);
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| QmdRenderError::Config {
                message: format!("Failed to serialize config: {}", e),
            })?;

        std::fs::write(path, content)
            .map_err(|e| QmdRenderError::Config {
                message: format!("Failed to write config file {}: {}", path.display(), e),
            })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.document.format.trim().is_empty() {
            return Err(QmdRenderError::Config {
                message: "Output format must not be empty".to_string(),
            });
        }

        if let Some(ref file) = self.document.file {
            if file.trim().is_empty() {
                return Err(QmdRenderError::Config {
                    message: "Document file name must not be empty".to_string(),
                });
            }
        }

        if self.quarto.timeout == Some(0) {
            return Err(QmdRenderError::Config {
                message: "Render timeout must be greater than 0".to_string(),
            });
        }

        if self.render.metadata.keys().any(|k| k.trim().is_empty()) {
            return Err(QmdRenderError::Config {
                message: "Metadata keys must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.quarto.timeout.map(Duration::from_secs)
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.document.file = Some("linear_equations.qmd".to_string());
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub folder: Option<PathBuf>,
    pub file: Option<String>,
    pub format: Option<String>,
    pub output_file: Option<String>,
    pub no_execute: bool,
    pub execute_dir: Option<PathBuf>,
    pub cache: Option<bool>,
    pub cache_refresh: bool,
    pub kernel_keepalive: Option<u32>,
    pub kernel_restart: bool,
    pub debug: bool,
    pub quiet: bool,
    pub params: BTreeMap<String, serde_json::Value>,
    pub metadata: BTreeMap<String, String>,
    pub pandoc_args: Vec<String>,
    pub quarto_path: Option<PathBuf>,
    pub timeout: Option<u64>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.folder = folder;
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    pub fn with_output_file(mut self, output_file: Option<String>) -> Self {
        self.output_file = output_file;
        self
    }

    pub fn with_no_execute(mut self, no_execute: bool) -> Self {
        self.no_execute = no_execute;
        self
    }

    pub fn with_execute_dir(mut self, execute_dir: Option<PathBuf>) -> Self {
        self.execute_dir = execute_dir;
        self
    }

    pub fn with_cache(mut self, cache: Option<bool>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_refresh(mut self, cache_refresh: bool) -> Self {
        self.cache_refresh = cache_refresh;
        self
    }

    pub fn with_kernel_keepalive(mut self, keepalive: Option<u32>) -> Self {
        self.kernel_keepalive = keepalive;
        self
    }

    pub fn with_kernel_restart(mut self, kernel_restart: bool) -> Self {
        self.kernel_restart = kernel_restart;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_pandoc_args(mut self, pandoc_args: Vec<String>) -> Self {
        self.pandoc_args = pandoc_args;
        self
    }

    pub fn with_quarto_path(mut self, path: Option<PathBuf>) -> Self {
        self.quarto_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }
}
