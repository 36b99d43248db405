//! File utilities for stores and artifacts.
//!
//! Every persisted file is replaced atomically: write `<name>.tmp` next to the
//! target, then rename over it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{AppError, AppResult};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub async fn atomic_write_bytes(path: &Path, content: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| AppError::output(parent, e))?;
        }
    }
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, content).await.map_err(|e| AppError::output(&tmp, e))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| AppError::output(path, e))?;
    Ok(())
}

pub async fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, content: &T) -> AppResult<()> {
    let json_str = serde_json::to_string_pretty(content)?;
    atomic_write_bytes(path, json_str.as_bytes()).await
}

/// Read and parse a JSON file; `Ok(None)` if it does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Like [`read_json`], but a file that does not parse is renamed to
/// `<name>.corrupt` and treated as missing.
pub async fn read_json_or_set_aside<T: DeserializeOwned>(path: &Path, what: &str) -> AppResult<Option<T>> {
    match read_json(path).await {
        Err(AppError::Json(e)) => {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(".corrupt");
            let aside = path.with_file_name(name);
            warn!("{} unreadable ({}), moving it to {}", what, e, aside.display());
            tokio::fs::rename(path, &aside).await?;
            Ok(None)
        }
        other => other,
    }
}

/// Create `dir` and check that a file can be written inside it.
pub async fn ensure_writable_dir(dir: &Path) -> AppResult<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| AppError::output(dir, e))?;
    let probe = dir.join(".subscout-write-check");
    tokio::fs::write(&probe, b"ok").await.map_err(|e| AppError::output(dir, e))?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

pub fn truncate_reason(reason: &str, max_len: usize) -> String {
    if reason.chars().count() <= max_len {
        return reason.to_string();
    }
    let mut s: String = reason.chars().take(max_len).collect();
    s.push('…');
    s
}
