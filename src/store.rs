//! JSON document persistence with atomic replace.
//!
//! Documents are written to a temporary file next to the target and renamed
//! over it, so an interrupted write leaves the previous document in place.

use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Load a JSON document, or `T::default()` when the file does not exist.
///
/// A present but unparseable document is an error: silently starting from
/// empty would overwrite the last good state on the next persist.
pub fn load_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!(path = %path.display(), "Document not found, starting empty");
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let doc = serde_json::from_str(&content)?;
    Ok(doc)
}

/// Serialize `doc` and atomically replace `path` with it.
pub fn write_atomic<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let persistence = |message: String| PipelineError::Persistence {
        path: path.display().to_string(),
        message,
    };

    let mut content =
        serde_json::to_string_pretty(doc).map_err(|e| persistence(format!("serialize: {}", e)))?;
    content.push('\n');

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| persistence(format!("create dir: {}", e)))?;

    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| persistence(format!("temp file: {}", e)))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| persistence(format!("write: {}", e)))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| persistence(format!("sync: {}", e)))?;
    tmp.persist(path)
        .map_err(|e| persistence(format!("rename: {}", e.error)))?;

    info!(path = %path.display(), bytes = content.len(), "Saved document");
    Ok(())
}
