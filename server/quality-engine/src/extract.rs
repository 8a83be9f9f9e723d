//! Event extraction from raw session logs.
//!
//! Logs interleave free text, `key: "value"` layout blocks, marker lines and
//! JSON-encoded entries. Each recognizer below is a small named rule; `Events`
//! drives them line by line and yields events lazily, in log order.
//!
//! Extraction is best-effort: a line that fails to parse is counted as
//! malformed and skipped, never fatal.

use std::collections::{BTreeMap, VecDeque};
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::grade;
use crate::normalize::{self, EntryItem, QuestionContext};
use crate::types::{Event, EventKind, Grade, QuestionRecord};

pub const LAYOUT_START: &str = "🎯 ============ BENTOLEARN LAYOUT DECISION ============";
pub const LAYOUT_END: &str = "🎯 ====================================================";

static LAYOUT_FIELD: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"(\w+):\s*["']([^"']+)["']"#).expect("layout field regex"));
static DETECTED_LAYOUT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"Detected layout:\s*(layout\w+)").expect("detected layout regex"));
static SUBJECT_MARKER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"Subject:\s*(\w+)").expect("subject marker regex"));
static CAREER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"[Cc]areer[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").expect("career marker regex")
});
static TOTAL_QUESTIONS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"totalQuestions:\s*(\d+)").expect("total questions regex"));
static GENERATED_PRACTICE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(\d+)\s*practice questions generated").expect("generated practice regex")
});

/// Literal fragments that mark a runtime failure, with their report label.
const ERROR_TOKENS: [(&str, &str); 4] = [
  ("TypeError:", "TypeError"),
  ("undefined is not", "Undefined error"),
  ("Cannot read properties of undefined", "Undefined property access"),
  ("is_undefined: true", "Missing correct_answer"),
];

// ---------------------------------------------------------------------------
// Named rules
// ---------------------------------------------------------------------------

/// All `key: "value"` pairs inside a layout block; the first occurrence of a key wins.
pub fn layout_fields(block: &str) -> BTreeMap<String, String> {
  let mut fields = BTreeMap::new();
  for caps in LAYOUT_FIELD.captures_iter(block) {
    fields
      .entry(caps[1].to_string())
      .or_insert_with(|| caps[2].to_string());
  }
  fields
}

/// `Detected layout: layoutGrid2` -> `layoutGrid2`.
pub fn detected_layout(line: &str) -> Option<String> {
  DETECTED_LAYOUT.captures(line).map(|c| c[1].to_string())
}

pub fn subject_marker(line: &str) -> Option<String> {
  SUBJECT_MARKER.captures(line).map(|c| c[1].to_string())
}

pub fn career_marker(line: &str) -> Option<String> {
  CAREER_MARKER.captures(line).map(|c| c[1].to_string())
}

/// Practice batch size announced in free text, with its origin tag.
pub fn practice_count(line: &str) -> Option<(usize, &'static str)> {
  if let Some(caps) = TOTAL_QUESTIONS.captures(line) {
    return caps[1].parse().ok().map(|n| (n, "rendered"));
  }
  GENERATED_PRACTICE
    .captures(line)
    .and_then(|caps| caps[1].parse().ok())
    .map(|n| (n, "generated"))
}

/// Labels of every runtime error fragment present on the line.
pub fn error_tokens(line: &str) -> impl Iterator<Item = &'static str> + '_ {
  ERROR_TOKENS
    .iter()
    .filter(move |(needle, _)| line.contains(needle))
    .map(|(_, label)| *label)
}

/// `None` unless the first non-whitespace character is `{`.
pub fn json_entry(line: &str) -> Option<Result<Value, serde_json::Error>> {
  let trimmed = line.trim();
  trimmed
    .starts_with('{')
    .then(|| serde_json::from_str(trimmed))
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

/// Extract events from one log file's text.
///
/// The returned iterator is lazy and single-pass; collect it to re-read events.
pub fn extract<'a>(log_text: &'a str, student: &str, filename: &str) -> Events<'a> {
  Events {
    lines: log_text.lines().enumerate(),
    student: student.to_string(),
    file: filename.to_string(),
    grade: grade::resolve(student),
    subject: None,
    career: None,
    block: None,
    pending: VecDeque::new(),
    malformed: 0,
  }
}

struct OpenBlock {
  line: usize,
  body: String,
}

pub struct Events<'a> {
  lines: Enumerate<Lines<'a>>,
  student: String,
  file: String,
  grade: Grade,
  subject: Option<String>,
  career: Option<String>,
  block: Option<OpenBlock>,
  pending: VecDeque<Event>,
  malformed: usize,
}

impl Events<'_> {
  /// Entries skipped so far (bad JSON, non-object questions, unterminated blocks).
  pub fn malformed_entries(&self) -> usize {
    self.malformed
  }

  fn scan_line(&mut self, n: usize, line: &str) {
    self.scan_layout_block(n, line);

    if let Some(layout_type) = detected_layout(line) {
      self.emit(
        EventKind::LayoutDecision,
        n,
        [("layoutType", layout_type), ("origin", "detected".into())],
        None,
      );
    }

    if let Some(subject) = subject_marker(line) {
      self.subject = Some(subject.clone());
      self.emit(EventKind::SubjectMarker, n, [("subject", subject)], None);
    }
    if let Some(career) = career_marker(line) {
      self.career = Some(career.clone());
      self.emit(EventKind::CareerMarker, n, [("career", career)], None);
    }

    match json_entry(line) {
      Some(Ok(entry)) => self.scan_entry(n, &entry),
      Some(Err(e)) => {
        self.malformed += 1;
        debug!(file = %self.file, line = n, error = %e, "skipping malformed JSON line");
      }
      None => {}
    }

    if let Some((size, origin)) = practice_count(line) {
      self.emit(
        EventKind::PracticeBatch,
        n,
        [("size", size.to_string()), ("origin", origin.into())],
        None,
      );
    }

    for token in error_tokens(line) {
      self.emit(
        EventKind::RawErrorToken,
        n,
        [("source", "runtime".into()), ("token", token.into())],
        None,
      );
    }
  }

  fn scan_layout_block(&mut self, n: usize, line: &str) {
    if let Some(mut open) = self.block.take() {
      match line.find(LAYOUT_END) {
        Some(end) => {
          open.body.push_str(&line[..end]);
          self.emit_layout_block(open.line, &open.body);
        }
        None => {
          open.body.push_str(line);
          open.body.push('\n');
          self.block = Some(open);
        }
      }
      return;
    }

    let Some(start) = line.find(LAYOUT_START) else {
      return;
    };
    let rest = &line[start + LAYOUT_START.len()..];
    match rest.find(LAYOUT_END) {
      Some(end) => self.emit_layout_block(n, &rest[..end]),
      None => {
        self.block = Some(OpenBlock {
          line: n,
          body: format!("{}\n", rest),
        })
      }
    }
  }

  fn emit_layout_block(&mut self, n: usize, body: &str) {
    self.pending.push_back(Event {
      kind: EventKind::LayoutDecision,
      fields: layout_fields(body),
      source_student: self.student.clone(),
      source_file: self.file.clone(),
      line: n,
      question: None,
    });
  }

  fn scan_entry(&mut self, n: usize, entry: &Value) {
    let ctx = QuestionContext {
      subject: self.subject.clone(),
      career: self.career.clone(),
      grade: self.grade,
    };

    for item in normalize::entry_items(entry, &ctx) {
      match item {
        EntryItem::PracticeBatch { size } => self.emit(
          EventKind::PracticeBatch,
          n,
          [("size", size.to_string()), ("origin", "jit".into())],
          None,
        ),
        EntryItem::Question(record) => self.emit_question(n, record),
        EntryItem::Validation(message) => self.emit(
          EventKind::RawErrorToken,
          n,
          [("source", "validation".into()), ("token", message)],
          None,
        ),
        EntryItem::Malformed(reason) => {
          self.malformed += 1;
          debug!(file = %self.file, line = n, %reason, "skipping malformed question");
        }
      }
    }
  }

  fn emit_question(&mut self, n: usize, record: QuestionRecord) {
    let mut fields = BTreeMap::from([
      ("questionType".to_string(), record.question_type.clone()),
      ("ordinal".to_string(), record.ordinal.field_value()),
    ]);
    if let Some(subject) = &record.subject {
      fields.insert("subject".into(), subject.clone());
    }
    if let Some(career) = &record.career {
      fields.insert("career".into(), career.clone());
    }

    self.pending.push_back(Event {
      kind: EventKind::QuestionRecord,
      fields,
      source_student: self.student.clone(),
      source_file: self.file.clone(),
      line: n,
      question: Some(record),
    });
  }

  fn emit<const N: usize>(
    &mut self,
    kind: EventKind,
    n: usize,
    fields: [(&str, String); N],
    question: Option<QuestionRecord>,
  ) {
    self.pending.push_back(Event {
      kind,
      fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
      source_student: self.student.clone(),
      source_file: self.file.clone(),
      line: n,
      question,
    });
  }
}

impl Iterator for Events<'_> {
  type Item = Event;

  fn next(&mut self) -> Option<Event> {
    loop {
      if let Some(event) = self.pending.pop_front() {
        return Some(event);
      }
      let Some((idx, line)) = self.lines.next() else {
        if let Some(open) = self.block.take() {
          self.malformed += 1;
          debug!(file = %self.file, line = open.line, "unterminated layout block");
        }
        return None;
      };
      self.scan_line(idx + 1, line);
    }
  }
}
