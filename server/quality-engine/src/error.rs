//! Structured error types for the quality engine.
//!
//! Malformed log lines are not errors: the extractor counts and skips them.
//! Per-file I/O failures are recorded in the aggregate and the run continues.
//! Only run-level failures reach the caller as `Err`.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("missing file: {}", path.display())]
  MissingFile { path: PathBuf },

  #[error("unreadable file: {}: {source}", path.display())]
  UnreadableFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("no readable input: {0}")]
  NoReadableInput(String),

  #[error("export: {}: {source}", path.display())]
  Export {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("config: {}: {reason}", path.display())]
  Config { path: PathBuf, reason: String },

  #[error("glob: {0}")]
  Glob(#[from] glob::PatternError),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  /// Classify a failed read of `path` into missing vs unreadable.
  pub fn from_read(path: &Path, source: std::io::Error) -> Self {
    if source.kind() == std::io::ErrorKind::NotFound {
      Self::MissingFile {
        path: path.to_path_buf(),
      }
    } else {
      Self::UnreadableFile {
        path: path.to_path_buf(),
        source,
      }
    }
  }

  pub fn config(path: &Path, reason: impl Into<String>) -> Self {
    Self::Config {
      path: path.to_path_buf(),
      reason: reason.into(),
    }
  }

  pub fn export(path: &Path, source: std::io::Error) -> Self {
    Self::Export {
      path: path.to_path_buf(),
      source,
    }
  }
}
