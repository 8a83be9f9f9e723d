//! Normalize JSON log entries into canonical question records.
//!
//! Entries are loosely shaped: practice lists and assessments may sit at the top
//! level or inside a `jitContent` wrapper, and answers may be numbers or strings.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::{Grade, Ordinal, QuestionRecord};

/// Inbound question object as written by the content generator.
/// Unknown fields are ignored; every known field defaults to empty.
#[derive(Debug, Default, Deserialize)]
pub struct RawQuestion {
  #[serde(rename = "type", default, deserialize_with = "lenient_string")]
  pub question_type: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub question: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub visual: String,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub correct_answer: Option<String>,
  #[serde(rename = "correctAnswer", default, deserialize_with = "lenient_opt_string")]
  pub correct_answer_camel: Option<String>,
}

/// Context markers in scope when the entry was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionContext {
  pub subject: Option<String>,
  pub career: Option<String>,
  pub grade: Grade,
}

/// One structured piece surfaced from a JSON entry, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryItem {
  PracticeBatch { size: usize },
  Question(QuestionRecord),
  Validation(String),
  /// A container element that could not be read as a question.
  Malformed(String),
}

/// Walk a parsed entry and surface batches, questions and validation errors.
pub fn entry_items(entry: &Value, ctx: &QuestionContext) -> Vec<EntryItem> {
  let mut items = Vec::new();
  walk(entry, ctx, &mut items);
  items
}

fn walk(entry: &Value, ctx: &QuestionContext, items: &mut Vec<EntryItem>) {
  let Some(obj) = entry.as_object() else {
    return;
  };

  if let Some(practice) = obj.get("practice").and_then(Value::as_array) {
    items.push(EntryItem::PracticeBatch {
      size: practice.len(),
    });
    for (i, q) in practice.iter().enumerate() {
      items.push(question_item(q, ctx, Ordinal::Practice(i + 1)));
    }
  }

  if let Some(assessment) = obj.get("assessment") {
    items.push(question_item(assessment, ctx, Ordinal::Assessment));
  }

  if let Some(error) = obj.get("validation").and_then(|v| v.get("error")) {
    items.push(EntryItem::Validation(value_text(error)));
  }

  if let Some(jit) = obj.get("jitContent") {
    walk(jit, ctx, items);
  }
}

fn question_item(value: &Value, ctx: &QuestionContext, ordinal: Ordinal) -> EntryItem {
  if !value.is_object() {
    return EntryItem::Malformed(format!("{}: expected object", ordinal));
  }
  match RawQuestion::deserialize(value) {
    Ok(raw) => EntryItem::Question(normalize_question(raw, ctx, ordinal)),
    Err(e) => EntryItem::Malformed(format!("{}: {}", ordinal, e)),
  }
}

/// Build a canonical record from a raw question; snake_case answer wins over camelCase.
pub fn normalize_question(raw: RawQuestion, ctx: &QuestionContext, ordinal: Ordinal) -> QuestionRecord {
  QuestionRecord {
    question_type: raw.question_type.trim().to_string(),
    text: raw.question,
    visual: raw.visual.trim().to_string(),
    correct_answer: raw
      .correct_answer
      .or(raw.correct_answer_camel)
      .unwrap_or_default(),
    subject: ctx.subject.clone(),
    career: ctx.career.clone(),
    grade: ctx.grade,
    ordinal,
  }
}

/// Render any JSON value as display text (strings unquoted, null empty).
fn value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Value::deserialize(d).map(|v| value_text(&v))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  Value::deserialize(d).map(|v| match v {
    Value::Null => None,
    other => Some(value_text(&other)),
  })
}
