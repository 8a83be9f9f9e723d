//! Integration tests for the quality engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use quality_engine::aggregate::AggregateState;
use quality_engine::discover::{self, DEFAULT_PATTERN};
use quality_engine::extract::{LAYOUT_END, LAYOUT_START};
use quality_engine::types::{Grade, MetricKey};
use quality_engine::{render_text, Config, Engine, EngineError, Export, IssueKind, LogSource, Severity};

fn kindergarten_log() -> String {
  format!(
    r#"[session] starting
📚 Subject: MATH
Career: Coach
{start}
  subject: "Math"
  layoutType: "grid-4"
  contentType: "numeric"
{end}
{{"jitContent": {{"practice": [{{"type": "counting", "question": "How many ⚽ are there?", "visual": "⚽⚽⚽", "correct_answer": 3}}, {{"type": "counting", "question": "Count the cones", "visual": "🛠🛠"}}, {{"type": "fill_blank", "question": "What comes after 2?", "visual": "❓"}}], "assessment": {{"type": "multiple_choice", "question": "Pick the BIGGEST number", "visual": ""}}}}}}
✅ 3 practice questions generated
totalQuestions: 3
{{"jitContent": {{"practice": [
TypeError: Cannot read properties of undefined (reading 'visual')
"#,
    start = LAYOUT_START,
    end = LAYOUT_END
  )
}

fn high_school_log() -> String {
  format!(
    r#"📚 Subject: ELA
Career: Chef
{start} layoutType: "vertical" contentType: "numeric" subject: "ELA" {end}
{start}
  layoutType: "grid-2"
  contentType: "shortText"
  subject: "ELA"
{end}
{{"jitContent": {{"practice": [{{"type": "multiple_choice", "question": "How many vowels are in the word chef?", "visual": ""}}, {{"type": "multiple_choice", "question": "How many pans does the chef need?", "visual": "🍳"}}, {{"type": "multiple_choice", "question": "Which word is a noun?", "visual": ""}}, {{"type": "multiple_choice", "question": "Which sentence is correct?", "visual": ""}}, {{"type": "multiple_choice", "question": "Which letter is uppercase?", "visual": ""}}]}}, "validation": {{"error": "correct_answer not in options"}}}}
totalQuestions: 5
"#,
    start = LAYOUT_START,
    end = LAYOUT_END
  )
}

fn write_run(root: &Path) {
  for (student, log) in [("sam-k", kindergarten_log()), ("taylor-10", high_school_log())] {
    let dir = root.join(student).join("AllSubjects");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("session.log"), log).unwrap();
  }
}

fn analyze_both(engine: &Engine) -> AggregateState {
  engine
    .analyze_text("sam-k", "session.log", &kindergarten_log())
    .merge(engine.analyze_text("taylor-10", "session.log", &high_school_log()))
}

#[test]
fn end_to_end_over_literal_logs() {
  let engine = Engine::with_defaults();
  let state = analyze_both(&engine);

  assert_eq!(state.files_analyzed, 2);
  assert_eq!(state.malformed_entries, 1);
  assert_eq!(state.total_layout_decisions(), 3);
  assert_eq!(state.layout_distribution["grid-4"], 1);
  assert_eq!(state.content_distribution["numeric"], 2);

  // sam-k: ⚽ duplicated, tool glyph for a coach, fill_blank phrased as a question,
  // all-caps BIGGEST, one short batch.
  assert_eq!(state.count(IssueKind::EmojiDuplication), 1);
  assert_eq!(state.count(IssueKind::WrongEmoji), 1);
  assert_eq!(state.count(IssueKind::FillBlankFormat), 1);
  assert_eq!(state.count(IssueKind::Uppercase), 1);
  assert_eq!(state.count(IssueKind::LowPractice), 1);

  // taylor-10: math term without ELA vocabulary, vertical/numeric mismatch, validation error.
  assert_eq!(state.count(IssueKind::SubjectContamination), 1);
  assert_eq!(state.count(IssueKind::LayoutMismatch), 1);
  assert_eq!(state.count(IssueKind::Validation), 1);

  let contamination = &state.issues_by_kind[&IssueKind::SubjectContamination][0];
  assert_eq!(contamination.student, "taylor-10");
  assert_eq!(contamination.severity, Severity::Critical);
  assert!(contamination.detail.contains("pans"));

  let sam = &state.stats_by_student["sam-k"];
  assert_eq!(sam.grade, Grade::Kindergarten);
  assert_eq!(sam.metric(&MetricKey::Questions), 4);
  assert_eq!(sam.metric(&MetricKey::MissingCareer), 0);
  assert_eq!(sam.metric(&MetricKey::PracticeMismatch), 1);
  assert!(sam.subjects.contains("MATH"));
  assert!(sam.subjects.contains("Math"));
  assert!(sam.errors.contains("TypeError"));
  assert!(sam.errors.contains("Undefined property access"));

  let taylor = &state.stats_by_student["taylor-10"];
  assert_eq!(taylor.grade, Grade::Level(10));
  assert_eq!(taylor.metric(&MetricKey::PracticeMismatch), 0);
  assert_eq!(taylor.metric(&MetricKey::MissingCareer), 3);
  assert!(taylor.errors.is_empty());
}

#[test]
fn analysis_is_deterministic_and_order_independent() {
  let engine = Engine::with_defaults();
  let a = analyze_both(&engine);
  let b = analyze_both(&engine);
  assert_eq!(a, b);

  let reversed = engine
    .analyze_text("taylor-10", "session.log", &high_school_log())
    .merge(engine.analyze_text("sam-k", "session.log", &kindergarten_log()));
  assert_eq!(a, reversed);

  let config = Config::default();
  assert_eq!(render_text(&a, &config), render_text(&reversed, &config));
}

#[test]
fn discovered_run_matches_in_memory_analysis() {
  let dir = tempfile::tempdir().unwrap();
  write_run(dir.path());

  let sources = discover::discover(dir.path(), DEFAULT_PATTERN).unwrap();
  assert_eq!(sources.len(), 2);
  assert_eq!(sources[0].student, "sam-k");

  let engine = Engine::with_defaults();
  let from_disk = engine.analyze_sources(&sources).unwrap();
  assert_eq!(from_disk, analyze_both(&engine));
}

#[test]
fn missing_file_is_skipped_and_reported() {
  let dir = tempfile::tempdir().unwrap();
  write_run(dir.path());
  let mut sources = discover::discover(dir.path(), DEFAULT_PATTERN).unwrap();
  sources.push(LogSource::new(dir.path().join("alex-1/AllSubjects/gone.log"), "alex-1"));

  let engine = Engine::with_defaults();
  let state = engine.analyze_sources(&sources).unwrap();
  assert_eq!(state.files_analyzed, 2);

  let skipped: Vec<_> = state.skipped_files.iter().collect();
  assert_eq!(skipped.len(), 1);
  assert!(skipped[0].path.ends_with("gone.log"));
  assert!(skipped[0].reason.contains("missing file"));

  let text = render_text(&state, engine.config());
  assert!(text.contains("Skipped Files:"));
  assert!(text.contains("Files skipped: 1"));
}

#[test]
fn empty_run_is_a_fatal_error() {
  let dir = tempfile::tempdir().unwrap();
  let sources = discover::discover(dir.path(), DEFAULT_PATTERN).unwrap();
  assert!(sources.is_empty());

  let engine = Engine::with_defaults();
  assert!(matches!(
    engine.analyze_sources(&sources),
    Err(EngineError::NoReadableInput(_))
  ));
}

#[test]
fn export_written_to_disk_round_trips() {
  let engine = Engine::with_defaults();
  let state = analyze_both(&engine);
  let generated_at = Utc.with_ymd_and_hms(2025, 9, 18, 9, 30, 0).unwrap();

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("analysis_results.json");
  Export::build(&state, engine.config(), generated_at)
    .write(&path)
    .unwrap();

  let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
  let summary = &json["summary"];
  assert_eq!(summary["generatedAt"], "2025-09-18T09:30:00Z");
  assert_eq!(summary["filesAnalyzed"], 2);
  assert_eq!(summary["malformedEntries"], 1);
  assert_eq!(summary["totalLayoutDecisions"], 3);
  assert_eq!(summary["practiceQuestionCounts"]["3"], 1);
  assert_eq!(summary["practiceQuestionCounts"]["5"], 1);
  assert_eq!(summary["uppercaseIssuesCount"], 1);
  assert_eq!(summary["subjectsByStudent"]["taylor-10"][0], "ELA");
  assert_eq!(summary["subjectsByStudent"]["sam-k"][1], "Math");
  assert_eq!(summary["errorsByStudent"]["sam-k"].as_array().unwrap().len(), 2);
  assert!(summary["errorsByStudent"].get("taylor-10").is_none());
  assert_eq!(summary["issuesBySeverity"]["critical"], 2);
  assert_eq!(summary["gradeBands"]["K-2"]["students"][0], "sam-k");
  assert_eq!(summary["gradeBands"]["9-12"]["layoutPreference"]["vertical"], 1);

  // Per-student counters re-sum to the global distributions.
  for (per_student, global) in [
    ("layoutTypes", "layoutDistribution"),
    ("contentTypes", "contentDistribution"),
  ] {
    let mut resummed = BTreeMap::<String, u64>::new();
    for result in json["detailedResults"].as_array().unwrap() {
      for (key, count) in result[per_student].as_object().unwrap() {
        *resummed.entry(key.clone()).or_default() += count.as_u64().unwrap();
      }
    }
    let global: BTreeMap<String, u64> = serde_json::from_value(summary[global].clone()).unwrap();
    assert_eq!(resummed, global, "{}", per_student);
  }
  assert_eq!(summary["contentDistribution"]["numeric"], 2);
  assert_eq!(summary["questionSamples"]["ELA"][1]["questionRef"], "Practice2");
}

#[test]
fn one_batch_reported_three_ways_counts_once() {
  let log = r#"📚 Subject: MATH
{"jitContent": {"practice": [{"type": "counting", "question": "How many?", "visual": "⚽"}, {"type": "counting", "question": "Count the cones", "visual": "⚽"}, {"type": "counting", "question": "How many stars?", "visual": "⭐"}]}}
✅ 3 practice questions generated
totalQuestions: 3
"#;
  let engine = Engine::with_defaults();
  let state = engine.analyze_text("alex-1", "session.log", log);

  assert_eq!(state.count(IssueKind::LowPractice), 1);
  assert_eq!(state.practice_question_counts, BTreeMap::from([(3, 1)]));
  let stats = &state.stats_by_student["alex-1"];
  assert_eq!(stats.metric(&MetricKey::PracticeMismatch), 1);
  assert_eq!(stats.metric(&MetricKey::PracticeBatches), 1);
  assert_eq!(stats.metric(&MetricKey::PracticeQuestions), 3);
}

#[test]
fn report_lists_sample_questions_by_subject() {
  let engine = Engine::with_defaults();
  let text = render_text(&analyze_both(&engine), engine.config());

  assert!(text.contains("SAMPLE QUESTIONS BY SUBJECT"));
  assert!(text.contains("\nMATH:\n  - sam-k (grade K) multiple_choice: Pick the BIGGEST number\n"));
  assert!(text.contains("  - sam-k (grade K) counting: How many ⚽ are there?\n    Visual: ⚽⚽⚽\n"));
  assert!(text.contains("  - taylor-10 (grade 10) multiple_choice: How many pans does the chef need?\n    Visual: 🍳\n"));
  assert!(!text.contains("Which word is a noun?"));
}

#[test]
fn preview_limit_comes_from_config() {
  let config = Config {
    preview_limit: 1,
    ..Config::default()
  };
  let engine = Engine::new(config);
  let state = analyze_both(&engine);
  let text = render_text(&state, engine.config());
  assert!(text.contains("... and 1 more"));
}
