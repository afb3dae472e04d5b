use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failed read or write against one of the three persisted stores (IV cache,
/// candidate table, execution table) or the event log. Always bubbles out of
/// `evaluate` to the caller even though the in-memory decision is still
/// returned alongside it.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("storage failure during {operation} on {path}: {underlying}")]
pub struct StorageFailure {
    pub path: PathBuf,
    pub operation: String,
    pub underlying: String,
}

impl StorageFailure {
    pub fn new(path: impl Into<PathBuf>, operation: impl Into<String>, underlying: impl ToString) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            underlying: underlying.to_string(),
        }
    }
}

/// The crate's single throwable error type. Domain failures never reach this
/// type — they are represented as `Reason`s attached to `DecisionOutput`
/// (see `crate::types::decision`). Only I/O and configuration failures throw.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageFailure),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] garde::Report),
}

pub type Result<T> = std::result::Result<T, EngineError>;
