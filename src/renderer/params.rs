use crate::error::{QmdRenderError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::NamedTempFile;

/// Parses a `key=value` execute parameter. The value is read as JSON when it
/// parses (numbers, booleans, arrays), otherwise it is kept as a string.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| QmdRenderError::InvalidParam {
        param: raw.to_string(),
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(QmdRenderError::InvalidParam {
            param: raw.to_string(),
        });
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    Ok((key.to_string(), value))
}

/// Parses a `key=value` metadata entry; the value is kept verbatim.
pub fn parse_metadata(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(QmdRenderError::InvalidParam {
            param: raw.to_string(),
        }),
    }
}

/// Writes execute params to a temporary YAML file for `--execute-params`.
///
/// JSON is a subset of YAML, so the params are written as pretty JSON. The
/// file is removed when the returned handle is dropped.
pub fn write_params_file(
    params: &BTreeMap<String, serde_json::Value>,
) -> Result<Option<NamedTempFile>> {
    if params.is_empty() {
        return Ok(None);
    }

    let mut file = tempfile::Builder::new()
        .prefix("qmdrender-params-")
        .suffix(".yml")
        .tempfile()?;

    let content = serde_json::to_string_pretty(params).map_err(|e| QmdRenderError::Config {
        message: format!("Failed to serialize execute params: {}", e),
    })?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    tracing::debug!(path = %file.path().display(), count = params.len(), "wrote execute params");
    Ok(Some(file))
}
