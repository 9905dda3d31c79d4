use crate::error::{QmdRenderError, Result};
use std::path::{Path, PathBuf};

/// Makes `folder` the working directory of the whole process.
///
/// The change is not undone; later relative paths, including the document
/// handed to the renderer, resolve against `folder`.
pub fn change_directory<P: AsRef<Path>>(folder: P) -> Result<PathBuf> {
    let folder = folder.as_ref();

    std::env::set_current_dir(folder).map_err(|e| QmdRenderError::DirectoryChange {
        path: folder.display().to_string(),
        source: e,
    })?;

    let current = std::env::current_dir()?;
    tracing::debug!(folder = %current.display(), "changed working directory");
    Ok(current)
}
