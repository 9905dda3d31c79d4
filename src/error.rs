use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QmdRenderError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No document to render was given")]
    MissingDocument,

    #[error("Cannot change working directory to {path}: {source}")]
    DirectoryChange {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to find quarto command line tools")]
    QuartoNotFound { searched: Vec<String> },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Quarto exited with {status}")]
    RenderFailed { status: String, stderr: String },

    #[error("{program} --version exited with {status}")]
    VersionCheck {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Render timed out after {} seconds", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Invalid parameter '{param}': expected key=value")]
    InvalidParam { param: String },
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for QmdRenderError {
    fn user_message(&self) -> String {
        match self {
            QmdRenderError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            QmdRenderError::DirectoryChange { path, source } => {
                format!("Cannot enter document folder {}: {}", path, source)
            }
            QmdRenderError::QuartoNotFound { searched } => {
                if searched.is_empty() {
                    "Unable to find quarto command line tools".to_string()
                } else {
                    format!(
                        "Unable to find quarto command line tools (looked in: {})",
                        searched.join(", ")
                    )
                }
            }
            QmdRenderError::RenderFailed { status, stderr } => {
                let tail = last_lines(stderr, 10);
                if tail.is_empty() {
                    format!("Quarto render failed ({})", status)
                } else {
                    format!("Quarto render failed ({}):\n{}", status, tail)
                }
            }
            QmdRenderError::VersionCheck {
                program,
                status,
                stderr,
            } => {
                let tail = last_lines(stderr, 3);
                if tail.is_empty() {
                    format!("{} is not a working quarto: --version exited with {}", program, status)
                } else {
                    format!(
                        "{} is not a working quarto: --version exited with {}:\n{}",
                        program, status, tail
                    )
                }
            }
            QmdRenderError::Timeout { timeout } => {
                format!("Render timed out after {} seconds", timeout.as_secs())
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            QmdRenderError::Config { .. } => Some(
                "Check your configuration file syntax or regenerate one with --generate-config.".to_string()
            ),
            QmdRenderError::MissingDocument => Some(
                "Pass the document as an argument (e.g., qmdrender report.qmd) or set [document].file in the configuration.".to_string()
            ),
            QmdRenderError::DirectoryChange { .. } => Some(
                "Verify the folder exists and that you can read it, or pick another one with --dir.".to_string()
            ),
            QmdRenderError::QuartoNotFound { .. } => Some(
                "Install Quarto from https://quarto.org, add it to PATH, or set QUARTO_PATH / --quarto-path.".to_string()
            ),
            QmdRenderError::RenderFailed { .. } => Some(
                "Run again with -vv to see the full quarto output.".to_string()
            ),
            QmdRenderError::VersionCheck { .. } => Some(
                "Reinstall Quarto or point --quarto-path / QUARTO_PATH at a working installation.".to_string()
            ),
            QmdRenderError::Timeout { .. } => Some(
                "Increase the limit with --timeout or remove it from the configuration.".to_string()
            ),
            QmdRenderError::InvalidParam { .. } => Some(
                "Parameters are written as key=value, e.g. -P alpha=0.1 -P title=Report.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for QmdRenderError {
    fn from(error: toml::de::Error) -> Self {
        QmdRenderError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QmdRenderError>;

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
