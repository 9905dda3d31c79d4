pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod renderer;
pub mod report;
pub mod ui;
pub mod workdir;

// Public API re-exports
pub use cli::{Cli, MessageFormat};
pub use config::{CliOverrides, Config, DocumentConfig, QuartoConfig, RenderConfig};
pub use error::{QmdRenderError, Result, UserFriendlyError};

// Core functionality re-exports
pub use renderer::{QuartoRenderer, RenderOptions, RenderOutcome, RenderRequest, Renderer};
pub use report::RenderReport;
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::Path;
use tokio::task;

/// Changes the process working directory to `folder`, then renders `file`
/// into `output_format` with quarto.
///
/// The directory change is permanent. Errors from either step are returned
/// as they occur; the file is not checked before quarto sees it.
pub fn render_as_doc<P: AsRef<Path>>(
    folder: P,
    file: &str,
    output_format: &str,
) -> Result<RenderOutcome> {
    render_as_doc_with(&QuartoRenderer::new(), folder, file, output_format)
}

/// [`render_as_doc`] with a caller-supplied renderer.
pub fn render_as_doc_with<R: Renderer, P: AsRef<Path>>(
    renderer: &R,
    folder: P,
    file: &str,
    output_format: &str,
) -> Result<RenderOutcome> {
    render_request(renderer, folder, &RenderRequest::new(file, output_format))
}

/// Changes into `folder` and forwards `request` to `renderer` unchanged.
pub fn render_request<R: Renderer, P: AsRef<Path>>(
    renderer: &R,
    folder: P,
    request: &RenderRequest,
) -> Result<RenderOutcome> {
    workdir::change_directory(folder)?;
    renderer.render(request)
}

/// Main library interface: one configured render with terminal feedback.
pub struct QmdRender {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl QmdRender {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        // Stdout carries the rendered document, so our own messages stay off it.
        let quiet =
            quiet || config.render.output_file.as_deref() == Some(renderer::STDOUT_OUTPUT);
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Create a QmdRender instance for testing (no signal handler registration)
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.message_format {
            MessageFormat::Human => OutputMode::Human,
            MessageFormat::Json => OutputMode::Json,
            MessageFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbosity_level(), cli_args.quiet)
    }

    /// The request the configuration describes.
    pub fn build_request(&self) -> Result<RenderRequest> {
        let file = self
            .config
            .document
            .file
            .clone()
            .ok_or(QmdRenderError::MissingDocument)?;

        Ok(RenderRequest::new(file, self.config.document.format.clone())
            .with_options(RenderOptions::from(&self.config.render)))
    }

    /// Quarto renderer wired to the configured binary, timeout and Ctrl+C flag.
    pub fn build_renderer(&self) -> QuartoRenderer {
        let renderer = QuartoRenderer::new()
            .with_timeout(self.config.timeout_duration())
            .with_cancellation(self.shutdown.flag());

        match self.config.quarto.path {
            Some(ref path) => renderer.with_program(path),
            None => renderer,
        }
    }

    pub async fn render_document(&self) -> Result<RenderReport> {
        let renderer = self.build_renderer();
        self.render_document_with(renderer).await
    }

    /// Runs the configured render on a blocking task with a spinner.
    pub async fn render_document_with<R>(&self, renderer: R) -> Result<RenderReport>
    where
        R: Renderer + Send + 'static,
    {
        self.shutdown.check_shutdown()?;

        let request = self.build_request()?;
        let folder = self.config.document.folder.clone();

        self.output_formatter.start_operation(&format!(
            "Rendering {} ({}) in {}",
            request.input,
            request.output_format,
            folder.display()
        ));

        let spinner = self
            .progress_manager
            .create_render_spinner(&request.input, &request.output_format);

        let task_request = request.clone();
        let joined = task::spawn_blocking(move || {
            let outcome = render_request(&renderer, &folder, &task_request)?;
            let folder = std::env::current_dir()?;
            Ok::<_, QmdRenderError>((folder, outcome))
        })
        .await
        .map_err(|e| QmdRenderError::Config {
            message: format!("Render task failed: {}", e),
        })
        .and_then(|result| result);

        let (folder, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                ui::progress::abandon_progress(&spinner, "Render failed");
                return Err(e);
            }
        };

        ui::progress::finish_progress_with_summary(&spinner, "Rendered", outcome.duration);

        for line in outcome.stderr.lines().filter(|l| !l.trim().is_empty()) {
            self.output_formatter.debug(line);
        }

        let report = RenderReport::new(&folder, &request, &outcome);
        self.output_formatter.debug(&report.command_line());

        Ok(report)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &QmdRenderError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Process exit code for an error.
pub fn exit_code(error: &QmdRenderError) -> i32 {
    match error {
        QmdRenderError::Cancelled => 130,
        QmdRenderError::Config { .. }
        | QmdRenderError::MissingDocument
        | QmdRenderError::InvalidParam { .. } => 2,
        QmdRenderError::DirectoryChange { .. } => 3,
        QmdRenderError::QuartoNotFound { .. }
        | QmdRenderError::Spawn { .. }
        | QmdRenderError::VersionCheck { .. } => 4,
        QmdRenderError::RenderFailed { .. } => 5,
        QmdRenderError::Timeout { .. } => 9,
        QmdRenderError::Io(_) => 1,
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_build_request_from_config() {
        let mut config = Config::default();
        config.document.file = Some("linear_equations.qmd".to_string());
        config.render.execute = false;
        let app = QmdRender::new_for_test(config, OutputMode::Plain, 0, true);

        let request = app.build_request().unwrap();
        assert_eq!(request.input, "linear_equations.qmd");
        assert_eq!(request.output_format, "html");
        assert!(!request.options.execute);
    }

    #[test]
    fn test_build_request_requires_document() {
        let app = QmdRender::new_for_test(Config::default(), OutputMode::Plain, 0, true);
        assert!(matches!(
            app.build_request(),
            Err(QmdRenderError::MissingDocument)
        ));
    }

    #[test]
    fn test_build_renderer_uses_configured_path() {
        let mut config = Config::default();
        config.quarto.path = Some(PathBuf::from("/no/such/quarto"));
        let app = QmdRender::new_for_test(config, OutputMode::Plain, 0, true);

        match app.build_renderer().locate() {
            Err(QmdRenderError::QuartoNotFound { searched }) => {
                assert_eq!(searched, vec!["/no/such/quarto".to_string()]);
            }
            other => panic!("unexpected locate result: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_reaches_renderer() {
        let app = QmdRender::new_for_test(Config::default(), OutputMode::Plain, 0, true);
        let renderer = app.build_renderer();
        assert!(renderer.is_running());

        app.request_shutdown();
        assert!(!app.is_running());
        assert!(!renderer.is_running());
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        QmdRender::generate_sample_config(&config_path).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[document]"));
        assert!(content.contains("[render]"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&QmdRenderError::Cancelled), 130);
        assert_eq!(exit_code(&QmdRenderError::MissingDocument), 2);
        assert_eq!(
            exit_code(&QmdRenderError::QuartoNotFound { searched: vec![] }),
            4
        );
        assert_eq!(
            exit_code(&QmdRenderError::VersionCheck {
                program: "quarto".to_string(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            }),
            4
        );
        assert_eq!(
            exit_code(&QmdRenderError::Timeout {
                timeout: Duration::from_secs(1)
            }),
            9
        );
    }

    #[test]
    fn test_version_info() {
        assert!(!version_info().is_empty());
    }
}
