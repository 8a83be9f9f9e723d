//! Core types for the quality engine (extracted events, findings, grades).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

/// Rendered in place of a subject, career or grade that could not be resolved.
pub const UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Events (what the extractor emits)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EventKind {
  LayoutDecision,
  PracticeBatch,
  QuestionRecord,
  SubjectMarker,
  CareerMarker,
  RawErrorToken,
}

/// Position of a question inside its JIT content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ordinal {
  /// 1-based position in the practice list.
  Practice(usize),
  Assessment,
}

impl Ordinal {
  /// Value stored in the event's `ordinal` field.
  pub fn field_value(self) -> String {
    match self {
      Self::Practice(n) => n.to_string(),
      Self::Assessment => "assessment".into(),
    }
  }
}

impl fmt::Display for Ordinal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Practice(n) => write!(f, "Practice{}", n),
      Self::Assessment => f.write_str("Assessment"),
    }
  }
}

/// One practice or assessment question.
///
/// Every payload string defaults to empty when the log entry omits it.
/// `subject` and `career` are `None` until a marker has been seen in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
  pub question_type: String,
  pub text: String,
  pub visual: String,
  pub correct_answer: String,
  pub subject: Option<String>,
  pub career: Option<String>,
  pub grade: Grade,
  pub ordinal: Ordinal,
}

/// One observed occurrence in a log. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub kind: EventKind,
  pub fields: BTreeMap<String, String>,
  pub source_student: String,
  pub source_file: String,
  /// 1-based line where the event was recognized.
  pub line: usize,
  /// Present iff `kind == EventKind::QuestionRecord`.
  pub question: Option<QuestionRecord>,
}

impl Event {
  pub fn field(&self, key: &str) -> Option<&str> {
    self.fields.get(key).map(String::as_str)
  }

  pub fn question(&self) -> Option<&QuestionRecord> {
    self.question.as_ref()
  }
}

// ---------------------------------------------------------------------------
// Grades
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
  Kindergarten,
  Level(u8),
  Unknown,
}

impl Grade {
  /// Numeric grade with kindergarten as 0.
  pub fn number(self) -> Option<u8> {
    match self {
      Self::Kindergarten => Some(0),
      Self::Level(n) => Some(n),
      Self::Unknown => None,
    }
  }
}

impl fmt::Display for Grade {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Kindergarten => f.write_str("K"),
      Self::Level(n) => write!(f, "{}", n),
      Self::Unknown => f.write_str(UNKNOWN),
    }
  }
}

impl Serialize for Grade {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GradeBand {
  Early,
  Middle,
  High,
  Unknown,
}

impl GradeBand {
  pub const KNOWN: [GradeBand; 3] = [Self::Early, Self::Middle, Self::High];

  pub fn is_known(self) -> bool {
    self != Self::Unknown
  }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Ordered most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Critical,
  Moderate,
  Minor,
}

impl Severity {
  pub const ALL: [Severity; 3] = [Self::Critical, Self::Moderate, Self::Minor];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Critical => "critical",
      Self::Moderate => "moderate",
      Self::Minor => "minor",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  SubjectContamination,
  Validation,
  EmojiDuplication,
  WrongEmoji,
  Uppercase,
  FillBlankFormat,
  LowPractice,
  LayoutMismatch,
}

impl IssueKind {
  pub const ALL: [IssueKind; 8] = [
    Self::SubjectContamination,
    Self::Validation,
    Self::EmojiDuplication,
    Self::WrongEmoji,
    Self::Uppercase,
    Self::FillBlankFormat,
    Self::LowPractice,
    Self::LayoutMismatch,
  ];

  pub fn severity(self) -> Severity {
    match self {
      Self::SubjectContamination | Self::Validation => Severity::Critical,
      Self::EmojiDuplication | Self::WrongEmoji | Self::Uppercase | Self::FillBlankFormat => {
        Severity::Moderate
      }
      Self::LowPractice | Self::LayoutMismatch => Severity::Minor,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::SubjectContamination => "subject_contamination",
      Self::Validation => "validation",
      Self::EmojiDuplication => "emoji_duplication",
      Self::WrongEmoji => "wrong_emoji",
      Self::Uppercase => "uppercase",
      Self::FillBlankFormat => "fill_blank_format",
      Self::LowPractice => "low_practice",
      Self::LayoutMismatch => "layout_mismatch",
    }
  }
}

/// A classified issue. Field order defines the canonical sort used by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
  pub student: String,
  pub source_file: String,
  pub line: usize,
  pub question_ref: String,
  pub issue_kind: IssueKind,
  pub severity: Severity,
  pub subject: String,
  pub detail: String,
  pub id: String,
}

// ---------------------------------------------------------------------------
// Per-student metrics
// ---------------------------------------------------------------------------

/// Counter keys tracked per student.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKey {
  PracticeBatches,
  PracticeQuestions,
  PracticeMismatch,
  Questions,
  MissingCareer,
  Errors,
  Layout(String),
  Content(String),
  Issue(IssueKind),
}

impl fmt::Display for MetricKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::PracticeBatches => f.write_str("practice_batches"),
      Self::PracticeQuestions => f.write_str("practice_questions"),
      Self::PracticeMismatch => f.write_str("practice_mismatch"),
      Self::Questions => f.write_str("questions"),
      Self::MissingCareer => f.write_str("missing_career"),
      Self::Errors => f.write_str("errors"),
      Self::Layout(t) => write!(f, "layout_{}", t),
      Self::Content(t) => write!(f, "content_{}", t),
      Self::Issue(k) => write!(f, "issue_{}", k.as_str()),
    }
  }
}
