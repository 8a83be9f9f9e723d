//! Core engine: runs extraction and classification per file, folds the results.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregateState, Observation};
use crate::classify::{self, RunningContext};
use crate::config::Config;
use crate::error::EngineError;
use crate::extract;
use crate::types::MetricKey;

/// One log file and the student it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogSource {
  pub path: PathBuf,
  pub student: String,
}

impl LogSource {
  pub fn new(path: impl Into<PathBuf>, student: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      student: student.into(),
    }
  }

  /// File name used as `source_file` on events and findings.
  pub fn file_name(&self) -> String {
    file_name(&self.path)
  }
}

/// The log quality engine. Stateless between runs; all run state lives in `AggregateState`.
pub struct Engine {
  config: Config,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Analyze one log's text into a partial aggregate.
  pub fn analyze_text(&self, student: &str, file: &str, text: &str) -> AggregateState {
    let mut state = AggregateState::new();
    let mut ctx = RunningContext::new();
    let mut events = extract::extract(text, student, file);

    for event in events.by_ref() {
      ctx.observe(&event);

      for finding in classify::classify(&event, &ctx, &self.config) {
        state.apply(Observation::Finding(finding));
      }
      if classify::missing_career(&event, &ctx, &self.config) {
        state.apply(Observation::Metric {
          student: student.to_string(),
          key: MetricKey::MissingCareer,
        });
      }
      if classify::practice_mismatch(&event, &self.config) {
        state.apply(Observation::Metric {
          student: student.to_string(),
          key: MetricKey::PracticeMismatch,
        });
      }

      state.apply(Observation::Event(event));
    }

    let malformed = events.malformed_entries();
    if malformed > 0 {
      debug!(student, file, malformed, "malformed entries skipped");
    }
    state.apply(Observation::Malformed {
      student: student.to_string(),
      count: malformed,
    });
    state.apply(Observation::FileAnalyzed {
      student: student.to_string(),
      path: file.to_string(),
    });
    state
  }

  /// Read one file and analyze it. Unreadable files become a skip record.
  pub fn analyze_source(&self, source: &LogSource) -> AggregateState {
    match std::fs::read(&source.path) {
      Ok(bytes) => {
        let text = String::from_utf8_lossy(&bytes);
        debug!(path = %source.path.display(), student = %source.student, "analyzing log");
        self.analyze_text(&source.student, &source.file_name(), &text)
      }
      Err(e) => {
        let err = EngineError::from_read(&source.path, e);
        warn!(path = %source.path.display(), error = %err, "skipping log file");
        AggregateState::new().fold(Observation::FileSkipped {
          path: source.path.display().to_string(),
          reason: err.to_string(),
        })
      }
    }
  }

  /// Analyze every source in parallel and merge the partial aggregates.
  ///
  /// Fails with `NoReadableInput` when `sources` is empty or no file could be read.
  pub fn analyze_sources(&self, sources: &[LogSource]) -> Result<AggregateState, EngineError> {
    if sources.is_empty() {
      return Err(EngineError::NoReadableInput("no log files to analyze".into()));
    }

    info!(files = sources.len(), "analyzing logs");
    let state = sources
      .par_iter()
      .map(|source| self.analyze_source(source))
      .reduce(AggregateState::default, AggregateState::merge);

    if state.files_analyzed == 0 {
      return Err(EngineError::NoReadableInput(format!(
        "none of the {} log files could be read",
        sources.len()
      )));
    }

    info!(
      analyzed = state.files_analyzed,
      skipped = state.skipped_files.len(),
      findings = state.findings().count(),
      malformed = state.malformed_entries,
      "analysis complete"
    );
    Ok(state)
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}
