//! Rule-based issue classification.
//!
//! Each rule is a pure function of one event, the markers in scope and the config,
//! and writes a single issue kind, so rule order never changes the outcome.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::fingerprint;
use crate::grade;
use crate::types::{Event, EventKind, Finding, GradeBand, IssueKind, QuestionRecord, UNKNOWN};

/// Most recent Subject/Career markers seen in the current file.
///
/// Advanced by the engine; the classifier only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningContext {
  subject: Option<String>,
  career: Option<String>,
}

impl RunningContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// Update from a marker event; other kinds are ignored.
  pub fn observe(&mut self, event: &Event) {
    match event.kind {
      EventKind::SubjectMarker => {
        if let Some(subject) = event.field("subject") {
          self.subject = Some(subject.to_string());
        }
      }
      EventKind::CareerMarker => {
        if let Some(career) = event.field("career") {
          self.career = Some(career.to_string());
        }
      }
      _ => {}
    }
  }

  pub fn subject(&self) -> Option<&str> {
    self.subject.as_deref()
  }

  pub fn career(&self) -> Option<&str> {
    self.career.as_deref()
  }
}

/// Subject and career that apply to a question: its own tags first, then the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
  pub subject: Option<&'a str>,
  pub career: Option<&'a str>,
}

impl<'a> Scope<'a> {
  pub fn of(question: &'a QuestionRecord, ctx: &'a RunningContext) -> Self {
    Self {
      subject: question.subject.as_deref().or(ctx.subject()),
      career: question.career.as_deref().or(ctx.career()),
    }
  }
}

type QuestionRule = fn(&QuestionRecord, Scope<'_>, &Config) -> Option<String>;

const QUESTION_RULES: [(IssueKind, QuestionRule); 5] = [
  (IssueKind::EmojiDuplication, emoji_duplication),
  (IssueKind::WrongEmoji, wrong_emoji),
  (IssueKind::SubjectContamination, subject_contamination),
  (IssueKind::Uppercase, uppercase_artifact),
  (IssueKind::FillBlankFormat, fill_blank_format),
];

/// Classify one event. Returns every finding the rules emit for it (possibly none).
pub fn classify(event: &Event, ctx: &RunningContext, config: &Config) -> Vec<Finding> {
  match event.kind {
    EventKind::QuestionRecord => {
      let Some(question) = event.question() else {
        return Vec::new();
      };
      let scope = Scope::of(question, ctx);
      let subject = scope.subject.unwrap_or(UNKNOWN);
      let question_ref = question.ordinal.to_string();

      QUESTION_RULES
        .iter()
        .filter_map(|(kind, rule)| {
          rule(question, scope, config)
            .map(|detail| finding(event, *kind, subject, &question_ref, detail))
        })
        .collect()
    }
    EventKind::PracticeBatch => low_practice(event, config)
      .map(|detail| finding(event, IssueKind::LowPractice, context_subject(event, ctx), "practice batch", detail))
      .into_iter()
      .collect(),
    EventKind::LayoutDecision => layout_mismatch(event, config)
      .map(|detail| {
        finding(event, IssueKind::LayoutMismatch, context_subject(event, ctx), "layout decision", detail)
      })
      .into_iter()
      .collect(),
    EventKind::RawErrorToken => validation_error(event)
      .map(|detail| finding(event, IssueKind::Validation, context_subject(event, ctx), "validation", detail))
      .into_iter()
      .collect(),
    EventKind::SubjectMarker | EventKind::CareerMarker => Vec::new(),
  }
}

/// Whether a question drops the career context it should carry.
///
/// A per-student statistic rather than a finding. Requires a career in scope and a
/// resolved grade above the lowest band.
pub fn missing_career(event: &Event, ctx: &RunningContext, config: &Config) -> bool {
  let Some(question) = event.question() else {
    return false;
  };
  let Some(career) = Scope::of(question, ctx).career else {
    return false;
  };
  let band = grade::band(question.grade, config);
  band.is_known()
    && band != GradeBand::Early
    && !question
      .text
      .to_lowercase()
      .contains(&career.to_lowercase())
}

/// Whether a generator-announced batch differs from the expected size in either direction.
pub fn practice_mismatch(event: &Event, config: &Config) -> bool {
  event.kind == EventKind::PracticeBatch
    && event.field("origin") == Some("generated")
    && event
      .field("size")
      .and_then(|s| s.parse::<usize>().ok())
      .is_some_and(|size| size != config.expected_practice_count)
}

fn finding(event: &Event, kind: IssueKind, subject: &str, question_ref: &str, detail: String) -> Finding {
  Finding {
    id: fingerprint::finding_id(
      &event.source_student,
      &event.source_file,
      event.line,
      question_ref,
      kind,
    ),
    issue_kind: kind,
    severity: kind.severity(),
    student: event.source_student.clone(),
    source_file: event.source_file.clone(),
    line: event.line,
    question_ref: question_ref.to_string(),
    subject: subject.to_string(),
    detail,
  }
}

/// Subject for non-question events: the marker in scope, then the event's own field.
fn context_subject<'a>(event: &'a Event, ctx: &'a RunningContext) -> &'a str {
  ctx
    .subject()
    .or_else(|| event.field("subject"))
    .unwrap_or(UNKNOWN)
}

// ---------------------------------------------------------------------------
// Question rules
// ---------------------------------------------------------------------------

/// Pictographs shared by the question text and its visual.
pub fn emoji_duplication(q: &QuestionRecord, _scope: Scope<'_>, config: &Config) -> Option<String> {
  if !has_visual(q, config) {
    return None;
  }
  let in_text = pictographs(&q.text, config);
  let shared: String = pictographs(&q.visual, config)
    .intersection(&in_text)
    .collect();
  (!shared.is_empty()).then(|| {
    format!(
      "emoji {} in both text '{}' and visual '{}'",
      shared,
      preview(&q.text, 30),
      q.visual
    )
  })
}

/// Career-inappropriate glyphs, or a named object whose glyph is missing from the visual.
/// Emits at most one finding per question.
pub fn wrong_emoji(q: &QuestionRecord, scope: Scope<'_>, config: &Config) -> Option<String> {
  let mut reasons = Vec::new();

  if let Some(career) = scope.career {
    let disallowed = config
      .career_disallowed_glyphs
      .iter()
      .filter(|(name, _)| name.eq_ignore_ascii_case(career))
      .flat_map(|(_, glyphs)| glyphs);
    for glyph in disallowed {
      if q.visual.contains(glyph.as_str()) {
        reasons.push(format!("{} glyph used for {}", glyph, career));
      }
    }
  }

  if has_visual(q, config) {
    let text = q.text.to_lowercase();
    for (object, glyph) in &config.object_glyphs {
      if text.contains(&object.to_lowercase()) && !q.visual.contains(glyph.as_str()) {
        reasons.push(format!("{} mentioned but visual '{}' lacks {}", object, q.visual, glyph));
      }
    }
  }

  (!reasons.is_empty()).then(|| reasons.join("; "))
}

/// Math vocabulary in an ELA question with no ELA vocabulary to justify it.
pub fn subject_contamination(q: &QuestionRecord, scope: Scope<'_>, config: &Config) -> Option<String> {
  if scope.subject != Some("ELA") {
    return None;
  }
  let text = q.text.to_lowercase();
  let math_term = config
    .math_terms
    .iter()
    .find(|term| text.contains(&term.to_lowercase()))?;
  let has_ela = config
    .ela_terms
    .iter()
    .any(|term| text.contains(&term.to_lowercase()));
  (!has_ela).then(|| {
    format!(
      "math term '{}' in ELA question '{}'",
      math_term,
      preview(&q.text, 50)
    )
  })
}

/// All-caps words of at least `uppercase_min_run` letters that are not allow-listed.
pub fn uppercase_artifact(q: &QuestionRecord, _scope: Scope<'_>, config: &Config) -> Option<String> {
  let mut words: Vec<&str> = Vec::new();
  for word in q.text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
    let is_caps_run = word.len() >= config.uppercase_min_run
      && word.chars().all(|c| c.is_ascii_uppercase());
    if is_caps_run && !config.uppercase_allow.iter().any(|a| a == word) && !words.contains(&word) {
      words.push(word);
    }
  }
  (!words.is_empty()).then(|| {
    format!(
      "all-caps {} in '{}'",
      words.join(", "),
      preview(&q.text, 50)
    )
  })
}

/// Fill-in-the-blank phrased as a question instead of a statement.
pub fn fill_blank_format(q: &QuestionRecord, _scope: Scope<'_>, _config: &Config) -> Option<String> {
  (q.question_type == "fill_blank" && q.text.trim_end().ends_with('?'))
    .then(|| format!("fill-blank is a question: '{}'", preview(&q.text, 50)))
}

// ---------------------------------------------------------------------------
// Event rules
// ---------------------------------------------------------------------------

/// A JIT practice list shorter than the expected count. One finding per batch.
///
/// Generator and renderer count lines describe the same batch and are ignored here.
pub fn low_practice(event: &Event, config: &Config) -> Option<String> {
  if event.kind != EventKind::PracticeBatch || event.field("origin") != Some("jit") {
    return None;
  }
  let size: usize = event.field("size")?.parse().ok()?;
  (size < config.expected_practice_count).then(|| {
    format!(
      "only {} practice questions (expected {})",
      size, config.expected_practice_count
    )
  })
}

/// A layout chosen against its content type (e.g. vertical for numeric answers).
pub fn layout_mismatch(event: &Event, config: &Config) -> Option<String> {
  if event.kind != EventKind::LayoutDecision {
    return None;
  }
  let layout = event.field("layoutType")?;
  let content = event.field("contentType")?;
  config
    .layout_mismatches
    .iter()
    .any(|m| m.layout_type == layout && m.content_type == content)
    .then(|| format!("{} layout for {} content", layout, content))
}

/// Validation error reported inside a JSON entry.
pub fn validation_error(event: &Event) -> Option<String> {
  if event.kind != EventKind::RawErrorToken || event.field("source") != Some("validation") {
    return None;
  }
  event.field("token").map(str::to_string)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn has_visual(q: &QuestionRecord, config: &Config) -> bool {
  !q.visual.is_empty() && q.visual != config.placeholder_visual
}

/// Pictographic characters in `s`, excluding the placeholder glyph.
fn pictographs(s: &str, config: &Config) -> BTreeSet<char> {
  s.chars()
    .filter(|c| is_pictograph(*c) && !config.placeholder_visual.contains(*c))
    .collect()
}

fn is_pictograph(c: char) -> bool {
  matches!(
    c as u32,
    0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2300..=0x23FF | 0x2B50..=0x2B55
  )
}

/// First `max` characters of `text`, with `...` when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
  match text.char_indices().nth(max) {
    Some((idx, _)) => format!("{}...", &text[..idx]),
    None => text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Grade, Ordinal};
  use std::collections::BTreeMap;

  fn question(question_type: &str, text: &str, visual: &str) -> QuestionRecord {
    QuestionRecord {
      question_type: question_type.into(),
      text: text.into(),
      visual: visual.into(),
      correct_answer: String::new(),
      subject: None,
      career: None,
      grade: Grade::Level(7),
      ordinal: Ordinal::Practice(1),
    }
  }

  fn question_event(q: QuestionRecord) -> Event {
    Event {
      kind: EventKind::QuestionRecord,
      fields: BTreeMap::new(),
      source_student: "jordan-7".into(),
      source_file: "all.log".into(),
      line: 10,
      question: Some(q),
    }
  }

  fn plain_event(kind: EventKind, fields: &[(&str, &str)]) -> Event {
    Event {
      kind,
      fields: fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
      source_student: "jordan-7".into(),
      source_file: "all.log".into(),
      line: 3,
      question: None,
    }
  }

  fn with_subject(mut q: QuestionRecord, subject: &str) -> QuestionRecord {
    q.subject = Some(subject.into());
    q
  }

  fn with_career(mut q: QuestionRecord, career: &str) -> QuestionRecord {
    q.career = Some(career.into());
    q
  }

  fn kinds(findings: &[Finding]) -> Vec<IssueKind> {
    findings.iter().map(|f| f.issue_kind).collect()
  }

  #[test]
  fn fill_blank_question_yields_exactly_one_finding() {
    let config = Config::default();
    let event = question_event(question("fill_blank", "What is the answer?", ""));
    let findings = classify(&event, &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::FillBlankFormat]);
    assert_eq!(findings[0].severity, crate::types::Severity::Moderate);
    assert_eq!(findings[0].question_ref, "Practice1");
  }

  #[test]
  fn fill_blank_statement_is_clean() {
    let config = Config::default();
    let event = question_event(question("fill_blank", "The coach blows the ___.", ""));
    assert!(classify(&event, &RunningContext::new(), &config).is_empty());
  }

  #[test]
  fn ela_with_ela_vocabulary_is_not_contaminated() {
    let config = Config::default();
    let q = with_subject(question("counting", "How many vowels are in this word", ""), "ELA");
    let findings = classify(&question_event(q), &RunningContext::new(), &config);
    assert!(!kinds(&findings).contains(&IssueKind::SubjectContamination));
  }

  #[test]
  fn ela_with_only_math_vocabulary_is_contaminated() {
    let config = Config::default();
    let q = with_subject(question("counting", "How many apples are there", ""), "ELA");
    let findings = classify(&question_event(q), &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::SubjectContamination]);
    assert_eq!(findings[0].severity, crate::types::Severity::Critical);
    assert_eq!(findings[0].subject, "ELA");
  }

  #[test]
  fn contamination_needs_ela_subject() {
    let config = Config::default();
    let q = with_subject(question("counting", "How many apples are there", ""), "MATH");
    assert!(classify(&question_event(q), &RunningContext::new(), &config).is_empty());

    let lower = with_subject(question("counting", "How many apples are there", ""), "ela");
    assert!(classify(&question_event(lower), &RunningContext::new(), &config).is_empty());

    let unknown = question("counting", "How many apples are there", "");
    assert!(classify(&question_event(unknown), &RunningContext::new(), &config).is_empty());
  }

  #[test]
  fn coach_with_tool_glyph_yields_exactly_one_wrong_emoji() {
    let config = Config::default();
    let q = with_career(question("counting", "Count the cones", "🛠🛠🛠"), "Coach");
    let findings = classify(&question_event(q), &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::WrongEmoji]);
  }

  #[test]
  fn wrong_emoji_reasons_are_merged() {
    let config = Config::default();
    let q = with_career(question("counting", "Count the whistles", "🛠🛠"), "Coach");
    let findings = classify(&question_event(q), &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::WrongEmoji]);
    assert!(findings[0].detail.contains("Coach"));
    assert!(findings[0].detail.contains("whistle"));
  }

  #[test]
  fn whistle_with_expected_glyph_is_clean() {
    let config = Config::default();
    let q = question("counting", "Count the whistles", "📣📣");
    assert!(wrong_emoji(&q, Scope::default(), &config).is_none());
  }

  #[test]
  fn career_from_context_drives_wrong_emoji() {
    let config = Config::default();
    let mut ctx = RunningContext::new();
    ctx.observe(&plain_event(EventKind::CareerMarker, &[("career", "Coach")]));
    let q = question("counting", "Count the cones", "🛠");
    let findings = classify(&question_event(q), &ctx, &config);
    assert_eq!(kinds(&findings), vec![IssueKind::WrongEmoji]);
  }

  #[test]
  fn emoji_duplication_requires_shared_pictographs() {
    let config = Config::default();
    let dup = question("counting", "How many ⚽ are there?", "⚽⚽⚽");
    assert!(emoji_duplication(&dup, Scope::default(), &config).is_some());

    let distinct = question("counting", "How many 🏀 are there?", "⚽⚽⚽");
    assert!(emoji_duplication(&distinct, Scope::default(), &config).is_none());

    let placeholder = question("counting", "How many ❓ are there?", "❓");
    assert!(emoji_duplication(&placeholder, Scope::default(), &config).is_none());
  }

  #[test]
  fn uppercase_respects_allow_list_and_min_run() {
    let config = Config::default();
    let flagged = question("multiple_choice", "Time to PLAY the GAME and LEARN", "");
    let detail = uppercase_artifact(&flagged, Scope::default(), &config).unwrap();
    assert!(detail.contains("PLAY, GAME"));
    assert!(!detail.contains("LEARN,"));

    let clean = question("multiple_choice", "LEARN with the USA team", "");
    assert!(uppercase_artifact(&clean, Scope::default(), &config).is_none());
  }

  #[test]
  fn low_practice_fires_once_per_short_batch() {
    let config = Config::default();
    let short = plain_event(EventKind::PracticeBatch, &[("size", "3"), ("origin", "jit")]);
    let findings = classify(&short, &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::LowPractice]);
    assert_eq!(findings[0].severity, crate::types::Severity::Minor);

    let full = plain_event(EventKind::PracticeBatch, &[("size", "5"), ("origin", "jit")]);
    assert!(classify(&full, &RunningContext::new(), &config).is_empty());
  }

  #[test]
  fn count_lines_do_not_repeat_low_practice() {
    let config = Config::default();
    for origin in ["generated", "rendered"] {
      let line = plain_event(EventKind::PracticeBatch, &[("size", "3"), ("origin", origin)]);
      assert!(classify(&line, &RunningContext::new(), &config).is_empty());
    }
  }

  #[test]
  fn practice_mismatch_counts_both_directions() {
    let config = Config::default();
    let batch = |size: &str| plain_event(EventKind::PracticeBatch, &[("size", size), ("origin", "generated")]);
    assert!(practice_mismatch(&batch("3"), &config));
    assert!(practice_mismatch(&batch("7"), &config));
    assert!(!practice_mismatch(&batch("5"), &config));
    let jit = plain_event(EventKind::PracticeBatch, &[("size", "3"), ("origin", "jit")]);
    assert!(!practice_mismatch(&jit, &config));
    assert!(!practice_mismatch(&plain_event(EventKind::SubjectMarker, &[("subject", "ELA")]), &config));
  }

  #[test]
  fn layout_mismatch_and_validation_rules() {
    let config = Config::default();
    let layout = plain_event(
      EventKind::LayoutDecision,
      &[("layoutType", "vertical"), ("contentType", "numeric"), ("subject", "Math")],
    );
    let findings = classify(&layout, &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::LayoutMismatch]);
    assert_eq!(findings[0].subject, "Math");

    let validation = plain_event(
      EventKind::RawErrorToken,
      &[("source", "validation"), ("token", "bad answer")],
    );
    let findings = classify(&validation, &RunningContext::new(), &config);
    assert_eq!(kinds(&findings), vec![IssueKind::Validation]);
    assert_eq!(findings[0].detail, "bad answer");

    let runtime = plain_event(EventKind::RawErrorToken, &[("source", "runtime"), ("token", "TypeError")]);
    assert!(classify(&runtime, &RunningContext::new(), &config).is_empty());
  }

  #[test]
  fn missing_career_depends_on_band_and_text() {
    let config = Config::default();
    let ctx = RunningContext::new();

    let missing = with_career(question("counting", "How many balls?", ""), "Coach");
    assert!(missing_career(&question_event(missing), &ctx, &config));

    let present = with_career(question("counting", "How many balls does the coach have?", ""), "Coach");
    assert!(!missing_career(&question_event(present), &ctx, &config));

    let mut early = with_career(question("counting", "How many balls?", ""), "Coach");
    early.grade = Grade::Level(1);
    assert!(!missing_career(&question_event(early), &ctx, &config));

    let mut unknown = with_career(question("counting", "How many balls?", ""), "Coach");
    unknown.grade = Grade::Unknown;
    assert!(!missing_career(&question_event(unknown), &ctx, &config));

    let no_career = question("counting", "How many balls?", "");
    assert!(!missing_career(&question_event(no_career), &ctx, &config));
  }

  #[test]
  fn classification_is_deterministic_and_context_independent_when_tagged() {
    let config = Config::default();
    let q = with_career(with_subject(question("counting", "How many apples?", "🛠"), "ELA"), "Coach");
    let event = question_event(q);

    let mut other = RunningContext::new();
    other.observe(&plain_event(EventKind::SubjectMarker, &[("subject", "MATH")]));
    other.observe(&plain_event(EventKind::CareerMarker, &[("career", "Chef")]));

    let a = classify(&event, &RunningContext::new(), &config);
    let b = classify(&event, &other, &config);
    assert_eq!(a, b);
    assert_eq!(kinds(&a), vec![IssueKind::WrongEmoji, IssueKind::SubjectContamination]);
  }

  #[test]
  fn preview_truncates_on_char_boundaries() {
    assert_eq!(preview("⚽⚽⚽⚽", 2), "⚽⚽...");
    assert_eq!(preview("short", 10), "short");
  }
}
