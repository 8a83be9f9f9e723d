//! Text report and JSON export built from a finished `AggregateState`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{AggregateState, QuestionSample, SkippedFile, StudentStats};
use crate::classify::preview;
use crate::config::Config;
use crate::error::EngineError;
use crate::grade;
use crate::stats::{most_common, percentage, total};
use crate::types::{Finding, Grade, IssueKind, MetricKey, Severity, UNKNOWN};

const RULE: &str = "================================================================================";

/// Render the human-readable report.
pub fn render_text(state: &AggregateState, config: &Config) -> String {
  Report { state, config }.to_string()
}

struct Report<'a> {
  state: &'a AggregateState,
  config: &'a Config,
}

impl fmt::Display for Report<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.issues(f)?;
    self.subjects(f)?;
    self.distributions(f)?;
    self.practice_sizes(f)?;
    self.students(f)?;
    self.grade_bands(f)?;
    self.samples(f)?;
    self.errors(f)?;
    self.totals(f)
  }
}

impl Report<'_> {
  fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{}", RULE)?;
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", RULE)
  }

  fn issues(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Self::heading(f, "QUALITY ISSUES")?;
    let severities = self.state.severity_counts();

    for severity in Severity::ALL {
      let count = severities.get(&severity).copied().unwrap_or(0);
      writeln!(f, "\n{} ({})", severity.as_str().to_uppercase(), count)?;

      for kind in IssueKind::ALL.iter().filter(|k| k.severity() == severity) {
        let Some(findings) = self.state.issues_by_kind.get(kind) else {
          continue;
        };
        writeln!(f, "  {}: {}", kind.as_str(), findings.len())?;
        self.preview_by_student(f, findings)?;
      }
    }
    Ok(())
  }

  /// Up to `preview_limit` findings per student, then a remainder line.
  fn preview_by_student(&self, f: &mut fmt::Formatter<'_>, findings: &[Finding]) -> fmt::Result {
    let mut by_student: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
      by_student.entry(finding.student.as_str()).or_default().push(finding);
    }

    for (student, list) in by_student {
      writeln!(f, "    {}:", student)?;
      for finding in list.iter().take(self.config.preview_limit) {
        writeln!(
          f,
          "      - [{}:{} {}] {}",
          finding.source_file, finding.line, finding.question_ref, finding.detail
        )?;
      }
      if list.len() > self.config.preview_limit {
        writeln!(f, "      ... and {} more", list.len() - self.config.preview_limit)?;
      }
    }
    Ok(())
  }

  fn subjects(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let by_subject = self.state.issues_by_subject();
    if by_subject.is_empty() {
      return Ok(());
    }
    writeln!(f, "\nIssues by Subject:")?;
    for (subject, kinds) in by_subject {
      let parts: Vec<String> = kinds
        .into_iter()
        .map(|(kind, count)| format!("{} {}", kind.as_str(), count))
        .collect();
      writeln!(f, "  {}: {}", subject, parts.join(", "))?;
    }
    Ok(())
  }

  fn distributions(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f)?;
    Self::heading(f, "LAYOUT AND CONTENT")?;
    let layouts = &self.state.layout_distribution;
    writeln!(f, "\nLayout Type Distribution ({} decisions):", total(layouts))?;
    counts_with_share(f, layouts)?;

    let contents = &self.state.content_distribution;
    writeln!(f, "\nContent Type Distribution:")?;
    counts_with_share(f, contents)
  }

  fn practice_sizes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "\nPractice Question Counts (expected {}):",
      self.config.expected_practice_count
    )?;
    if self.state.practice_question_counts.is_empty() {
      writeln!(f, "  none")?;
    }
    for (size, batches) in &self.state.practice_question_counts {
      writeln!(f, "  {} questions: {} batch(es)", size, batches)?;
    }
    Ok(())
  }

  fn students(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f)?;
    Self::heading(f, "STUDENTS")?;
    for (student, stats) in &self.state.stats_by_student {
      let band = grade::band(stats.grade, self.config);
      writeln!(
        f,
        "\n{} (grade {}, band {})",
        student,
        stats.grade,
        grade::band_label(band, self.config)
      )?;
      writeln!(f, "  Subjects tested: {}", join_or_unknown(stats.subjects.iter()))?;

      let layouts = stats.layout_types();
      let top = most_common(&layouts)
        .first()
        .map(|(layout, count)| format!("{} ({})", layout, count))
        .unwrap_or_else(|| "none".into());
      writeln!(f, "  Layout decisions: {} (most common: {})", total(&layouts), top)?;
      writeln!(
        f,
        "  Questions: {}  practice batches: {}  off-size batches: {}",
        stats.metric(&MetricKey::Questions),
        stats.metric(&MetricKey::PracticeBatches),
        stats.metric(&MetricKey::PracticeMismatch)
      )?;
      writeln!(
        f,
        "  Issues: {}  missing career context: {}",
        self.state.findings_for(student).count(),
        stats.metric(&MetricKey::MissingCareer)
      )?;
    }
    Ok(())
  }

  fn grade_bands(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f)?;
    Self::heading(f, "GRADE BANDS")?;
    for (band, rollup) in self.state.grade_bands(self.config) {
      writeln!(
        f,
        "\n{}: {} student(s)",
        grade::band_label(band, self.config),
        rollup.students.len()
      )?;
      if band.is_known() {
        counts_with_share(f, &rollup.layout_preference)?;
      } else {
        for (layout, count) in most_common(&rollup.layout_preference) {
          writeln!(f, "  {}: {}", layout, count)?;
        }
      }
      for (subject, layouts) in &rollup.subjects {
        let parts: Vec<String> = most_common(layouts)
          .into_iter()
          .map(|(layout, count)| format!("{} {}", layout, count))
          .collect();
        writeln!(f, "  {}: {}", subject, parts.join(", "))?;
      }
    }
    Ok(())
  }

  fn samples(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.state.question_samples.is_empty() {
      return Ok(());
    }
    writeln!(f)?;
    Self::heading(f, "SAMPLE QUESTIONS BY SUBJECT")?;
    for (subject, samples) in &self.state.question_samples {
      writeln!(f, "\n{}:", subject)?;
      for sample in samples {
        writeln!(
          f,
          "  - {} (grade {}) {}: {}",
          sample.student,
          sample.grade,
          sample.question_type,
          preview(&sample.text, 100)
        )?;
        if !sample.visual.is_empty() && sample.visual != self.config.placeholder_visual {
          writeln!(f, "    Visual: {}", sample.visual)?;
        }
      }
    }
    Ok(())
  }

  fn errors(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let with_errors: Vec<(&String, &StudentStats)> = self
      .state
      .stats_by_student
      .iter()
      .filter(|(_, stats)| !stats.errors.is_empty())
      .collect();
    if !with_errors.is_empty() {
      writeln!(f, "\nErrors by Student:")?;
      for (student, stats) in with_errors {
        writeln!(f, "  {}: {}", student, join_or_unknown(stats.errors.iter()))?;
      }
    }

    if !self.state.skipped_files.is_empty() {
      writeln!(f, "\nSkipped Files:")?;
      for skipped in &self.state.skipped_files {
        writeln!(f, "  {}: {}", skipped.path, skipped.reason)?;
      }
    }
    Ok(())
  }

  fn totals(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f)?;
    Self::heading(f, "TOTALS")?;
    writeln!(f, "Files analyzed: {}", self.state.files_analyzed)?;
    writeln!(f, "Files skipped: {}", self.state.skipped_files.len())?;
    writeln!(f, "Malformed entries: {}", self.state.malformed_entries)?;
    writeln!(f, "Layout decisions: {}", self.state.total_layout_decisions())?;
    writeln!(f, "Findings: {}", self.state.findings().count())
  }
}

fn counts_with_share(f: &mut fmt::Formatter<'_>, counts: &BTreeMap<String, u64>) -> fmt::Result {
  let sum = total(counts);
  for (key, count) in most_common(counts) {
    writeln!(f, "  {}: {} ({:.1}%)", key, count, percentage(count, sum))?;
  }
  Ok(())
}

fn join_or_unknown<'a>(items: impl Iterator<Item = &'a String>) -> String {
  let joined: Vec<&str> = items.map(String::as_str).collect();
  if joined.is_empty() {
    UNKNOWN.to_string()
  } else {
    joined.join(", ")
  }
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

/// Machine-readable export. Nothing is truncated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Export {
  pub summary: Summary,
  pub detailed_results: Vec<StudentResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub generated_at: DateTime<Utc>,
  pub files_analyzed: u64,
  pub malformed_entries: u64,
  pub skipped_files: Vec<SkippedFile>,
  pub total_layout_decisions: u64,
  pub layout_distribution: BTreeMap<String, u64>,
  pub content_distribution: BTreeMap<String, u64>,
  /// issue kind -> finding count
  pub common_issues: BTreeMap<&'static str, u64>,
  pub issues_by_severity: BTreeMap<&'static str, u64>,
  /// subject -> issue kind -> finding count
  pub issues_by_subject: BTreeMap<String, BTreeMap<&'static str, u64>>,
  pub practice_question_counts: BTreeMap<usize, u64>,
  pub subjects_by_student: BTreeMap<String, Vec<String>>,
  pub uppercase_issues_count: usize,
  /// Only students with at least one runtime error.
  pub errors_by_student: BTreeMap<String, Vec<String>>,
  pub grade_bands: BTreeMap<String, BandSummary>,
  pub issues_by_kind: BTreeMap<&'static str, Vec<Finding>>,
  pub question_samples: BTreeMap<String, Vec<QuestionSample>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandSummary {
  pub students: Vec<String>,
  pub layout_preference: BTreeMap<String, u64>,
  /// Absent for the unknown band.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub layout_percentages: Option<BTreeMap<String, f64>>,
  pub subjects: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
  pub student: String,
  pub grade: Grade,
  pub grade_band: String,
  pub subjects: Vec<String>,
  pub layout_types: BTreeMap<String, u64>,
  pub content_types: BTreeMap<String, u64>,
  pub metrics: BTreeMap<String, u64>,
  pub issues: Vec<Finding>,
  pub errors: Vec<String>,
}

impl Export {
  pub fn build(state: &AggregateState, config: &Config, generated_at: DateTime<Utc>) -> Self {
    Self {
      summary: Summary::build(state, config, generated_at),
      detailed_results: state
        .stats_by_student
        .iter()
        .map(|(student, stats)| StudentResult::build(state, config, student, stats))
        .collect(),
    }
  }

  pub fn to_json_pretty(&self) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Write pretty JSON to `path`, replacing any existing file.
  pub fn write(&self, path: &Path) -> Result<(), EngineError> {
    let json = self.to_json_pretty()?;
    std::fs::write(path, json).map_err(|e| EngineError::export(path, e))
  }
}

impl Summary {
  fn build(state: &AggregateState, config: &Config, generated_at: DateTime<Utc>) -> Self {
    let grade_bands = state
      .grade_bands(config)
      .into_iter()
      .map(|(band, rollup)| {
        let sum = total(&rollup.layout_preference);
        let layout_percentages = band.is_known().then(|| {
          rollup
            .layout_preference
            .iter()
            .map(|(layout, count)| (layout.clone(), percentage(*count, sum)))
            .collect()
        });
        (
          grade::band_label(band, config),
          BandSummary {
            students: rollup.students.into_iter().collect(),
            layout_preference: rollup.layout_preference,
            layout_percentages,
            subjects: rollup.subjects,
          },
        )
      })
      .collect();

    Self {
      generated_at,
      files_analyzed: state.files_analyzed,
      malformed_entries: state.malformed_entries,
      skipped_files: state.skipped_files.iter().cloned().collect(),
      total_layout_decisions: state.total_layout_decisions(),
      layout_distribution: state.layout_distribution.clone(),
      content_distribution: state.content_distribution.clone(),
      common_issues: state
        .issues_by_kind
        .iter()
        .map(|(kind, findings)| (kind.as_str(), findings.len() as u64))
        .collect(),
      issues_by_severity: state
        .severity_counts()
        .into_iter()
        .map(|(severity, count)| (severity.as_str(), count))
        .collect(),
      issues_by_subject: state
        .issues_by_subject()
        .into_iter()
        .map(|(subject, kinds)| {
          let kinds = kinds.into_iter().map(|(kind, count)| (kind.as_str(), count)).collect();
          (subject, kinds)
        })
        .collect(),
      practice_question_counts: state.practice_question_counts.clone(),
      subjects_by_student: state
        .stats_by_student
        .iter()
        .map(|(student, stats)| (student.clone(), stats.subjects.iter().cloned().collect()))
        .collect(),
      uppercase_issues_count: state.count(IssueKind::Uppercase),
      errors_by_student: state
        .stats_by_student
        .iter()
        .filter(|(_, stats)| !stats.errors.is_empty())
        .map(|(student, stats)| (student.clone(), stats.errors.iter().cloned().collect()))
        .collect(),
      grade_bands,
      issues_by_kind: state
        .issues_by_kind
        .iter()
        .map(|(kind, findings)| (kind.as_str(), findings.clone()))
        .collect(),
      question_samples: state
        .question_samples
        .iter()
        .map(|(subject, samples)| (subject.clone(), samples.iter().cloned().collect()))
        .collect(),
    }
  }
}

impl StudentResult {
  fn build(state: &AggregateState, config: &Config, student: &str, stats: &StudentStats) -> Self {
    Self {
      student: student.to_string(),
      grade: stats.grade,
      grade_band: grade::band_label(grade::band(stats.grade, config), config),
      subjects: stats.subjects.iter().cloned().collect(),
      layout_types: stats.layout_types(),
      content_types: stats.content_types(),
      metrics: stats
        .metrics
        .iter()
        .map(|(key, count)| (key.to_string(), *count))
        .collect(),
      issues: state.findings_for(student).cloned().collect(),
      errors: stats.errors.iter().cloned().collect(),
    }
  }
}
