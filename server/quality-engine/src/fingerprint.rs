//! Stable finding ids for cross-run comparison of reports.

use crate::types::IssueKind;

/// Compute a stable id from a finding's provenance and kind.
///
/// Key components: student + file + line + question ref + issue kind.
/// Uses blake3 for a fast, deterministic hash; `fnd-` + 16 hex chars.
pub fn finding_id(
  student: &str,
  source_file: &str,
  line: usize,
  question_ref: &str,
  kind: IssueKind,
) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(student.as_bytes());
  hasher.update(b"|");
  hasher.update(source_file.as_bytes());
  hasher.update(b"|");
  hasher.update(line.to_string().as_bytes());
  hasher.update(b"|");
  hasher.update(question_ref.as_bytes());
  hasher.update(b"|");
  hasher.update(kind.as_str().as_bytes());

  let hex = hasher.finalize().to_hex();
  format!("fnd-{}", &hex[..16])
}
