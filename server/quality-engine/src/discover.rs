//! Log file discovery under a test-run root.

use std::path::Path;

use glob::glob;
use tracing::warn;

use crate::engine::LogSource;
use crate::error::EngineError;
use crate::types::UNKNOWN;

/// Default layout: `<root>/<student>/AllSubjects/<file>.log`.
pub const DEFAULT_PATTERN: &str = "*/AllSubjects/*.log";

const SUBJECTS_DIR: &str = "AllSubjects";

/// Find log files matching `pattern` under `root`, sorted by path.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<LogSource>, EngineError> {
  let resolved = resolve_glob(root, pattern);
  let mut sources = Vec::new();

  for entry in glob(&resolved)? {
    match entry {
      Ok(path) if path.is_file() => {
        let student = student_for(&path);
        sources.push(LogSource::new(path, student));
      }
      Ok(_) => {}
      Err(e) => warn!(path = %e.path().display(), error = %e.error(), "cannot inspect path"),
    }
  }

  sources.sort();
  Ok(sources)
}

/// Join `pattern` onto `root`, escaping glob metacharacters in the root itself.
pub fn resolve_glob(root: &Path, pattern: &str) -> String {
  let root = glob::Pattern::escape(&root.to_string_lossy());
  if root.is_empty() {
    pattern.to_string()
  } else {
    format!("{}/{}", root.trim_end_matches('/'), pattern)
  }
}

/// Student id for a log path: the directory above `AllSubjects`, else the parent directory.
pub fn student_for(path: &Path) -> String {
  let Some(parent) = path.parent() else {
    return UNKNOWN.to_string();
  };
  let dir = if parent.file_name().is_some_and(|n| n == SUBJECTS_DIR) {
    parent.parent()
  } else {
    Some(parent)
  };
  dir
    .and_then(Path::file_name)
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn student_from_all_subjects_layout() {
    assert_eq!(student_for(Path::new("run/sam-k/AllSubjects/log.log")), "sam-k");
    assert_eq!(student_for(Path::new("run/taylor-10/math.log")), "taylor-10");
    assert_eq!(student_for(Path::new("log.log")), UNKNOWN);
  }

  #[test]
  fn discovers_sorted_matches() {
    let dir = tempfile::tempdir().unwrap();
    for student in ["taylor-10", "sam-k"] {
      let subjects = dir.path().join(student).join(SUBJECTS_DIR);
      fs::create_dir_all(&subjects).unwrap();
      fs::write(subjects.join("run.log"), "Subject: ELA\n").unwrap();
      fs::write(subjects.join("notes.txt"), "ignored").unwrap();
    }

    let sources = discover(dir.path(), DEFAULT_PATTERN).unwrap();
    let students: Vec<&str> = sources.iter().map(|s| s.student.as_str()).collect();
    assert_eq!(students, vec!["sam-k", "taylor-10"]);
    assert!(sources.iter().all(|s| s.path.ends_with("AllSubjects/run.log")));
  }

  #[test]
  fn root_with_brackets_is_escaped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Round [1]");
    let subjects = root.join("alex-1").join(SUBJECTS_DIR);
    fs::create_dir_all(&subjects).unwrap();
    fs::write(subjects.join("a.log"), "").unwrap();

    let sources = discover(&root, DEFAULT_PATTERN).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].student, "alex-1");
  }

  #[test]
  fn bad_pattern_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      discover(dir.path(), "***/[.log"),
      Err(EngineError::Glob(_))
    ));
  }
}
