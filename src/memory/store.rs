//! Generic atomic JSON table load/save and append-only JSONL event log
//! (§5 Concurrency & Resource Model: writes atomic at the persisted-file
//! granularity).

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{EngineError, Result, StorageFailure};

/// Reads a JSON table, returning `T::default()` if the file does not exist
/// yet. A present-but-corrupt file is a hard storage failure, not silently
/// discarded.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
            EngineError::Storage(StorageFailure::new(path.to_path_buf(), "parse", e.to_string()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "table file absent, starting from default");
            Ok(T::default())
        }
        Err(e) => Err(EngineError::Storage(StorageFailure::new(path.to_path_buf(), "read", e.to_string()))),
    }
}

/// Serialises `value` to a sibling temp file, then renames it over `path`.
/// The rename is atomic on the same filesystem, so a reader never observes a
/// half-written table.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::Storage(StorageFailure::new(parent.to_path_buf(), "mkdir", e.to_string())))?;
    }
    let tmp_path = path.with_extension("tmp");
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "serialize", e.to_string())))?;

    let mut file = File::create(&tmp_path)
        .map_err(|e| EngineError::Storage(StorageFailure::new(tmp_path.clone(), "create", e.to_string())))?;
    file.write_all(&body)
        .map_err(|e| EngineError::Storage(StorageFailure::new(tmp_path.clone(), "write", e.to_string())))?;
    file.sync_all()
        .map_err(|e| EngineError::Storage(StorageFailure::new(tmp_path.clone(), "sync", e.to_string())))?;

    fs::rename(&tmp_path, path)
        .map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "rename", e.to_string())))?;
    Ok(())
}

/// Appends one JSON line to an append-only log, opening with `O_APPEND`
/// semantics so concurrent writers never interleave mid-record.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::Storage(StorageFailure::new(parent.to_path_buf(), "mkdir", e.to_string())))?;
    }
    let mut line = serde_json::to_string(value)
        .map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "serialize", e.to_string())))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "open", e.to_string())))?;
    file.write_all(line.as_bytes())
        .map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "append", e.to_string())))?;
    Ok(())
}

/// Reads every line of a JSONL log. A line that fails to parse is logged
/// and skipped rather than aborting the whole read — the log is meant to be
/// append-only and forward-compatible.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::Storage(StorageFailure::new(path.to_path_buf(), "open", e.to_string()))),
    };
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EngineError::Storage(StorageFailure::new(path.to_path_buf(), "read", e.to_string())))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(value) => out.push(value),
            Err(e) => warn!(path = %path.display(), line = idx, error = %e, "skipping malformed jsonl record"),
        }
    }
    Ok(out)
}
