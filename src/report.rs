use crate::renderer::{RenderOutcome, RenderRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Summary of one render, printed at the end of a CLI run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub document: String,
    pub folder: PathBuf,
    pub output_format: String,
    pub output_path: Option<PathBuf>,
    pub output_exists: bool,
    /// The document was written to stdout rather than to a file.
    pub output_streamed: bool,
    pub quarto: PathBuf,
    pub arguments: Vec<String>,
    pub rendered_at: DateTime<Utc>,
    pub duration: Duration,
    pub warnings: Vec<String>,
}

impl RenderReport {
    pub fn new(folder: &Path, request: &RenderRequest, outcome: &RenderOutcome) -> Self {
        let output_path = outcome.output_path.as_ref().map(|p| folder.join(p));
        let output_exists = output_path.as_ref().is_some_and(|p| p.exists());

        let mut warnings = Vec::new();
        if let Some(ref path) = output_path {
            if !output_exists {
                tracing::warn!(path = %path.display(), "expected output not found");
                warnings.push(format!("Expected output not found: {}", path.display()));
            }
        }

        Self {
            document: request.input.clone(),
            folder: folder.to_path_buf(),
            output_format: request.output_format.clone(),
            output_path,
            output_exists,
            output_streamed: request.options.writes_to_stdout(),
            quarto: outcome.program.clone(),
            arguments: outcome.arguments.clone(),
            rendered_at: Utc::now(),
            duration: outcome.duration,
            warnings,
        }
    }

    pub fn command_line(&self) -> String {
        let mut parts = vec![self.quarto.display().to_string()];
        parts.extend(self.arguments.iter().cloned());
        parts.join(" ")
    }
}
