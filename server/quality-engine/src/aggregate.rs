//! Run-scoped aggregation of events, findings and metrics.
//!
//! Every update is a counter increment, a set insert or a sorted-list insert, so the
//! final state does not depend on fold order. Per-file partial states are combined
//! with `merge`, which is commutative and associative with `default()` as identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::Config;
use crate::grade;
use crate::stats::{bump, merge_counts};
use crate::types::{
  Event, EventKind, Finding, Grade, GradeBand, IssueKind, MetricKey, Severity, UNKNOWN,
};

/// Sample questions kept per subject.
pub const SAMPLES_PER_SUBJECT: usize = 2;

/// One unit of input to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
  Event(Event),
  Finding(Finding),
  Metric { student: String, key: MetricKey },
  Malformed { student: String, count: usize },
  FileAnalyzed { student: String, path: String },
  FileSkipped { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SkippedFile {
  pub path: String,
  pub reason: String,
}

/// Counters and sets for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentStats {
  pub grade: Grade,
  pub metrics: BTreeMap<MetricKey, u64>,
  /// subject -> layout type -> count
  pub layout_by_subject: BTreeMap<String, BTreeMap<String, u64>>,
  pub subjects: BTreeSet<String>,
  pub careers: BTreeSet<String>,
  /// Runtime error labels seen in this student's logs.
  pub errors: BTreeSet<String>,
  pub files: BTreeSet<String>,
}

impl StudentStats {
  pub fn new(student: &str) -> Self {
    Self {
      grade: grade::resolve(student),
      metrics: BTreeMap::new(),
      layout_by_subject: BTreeMap::new(),
      subjects: BTreeSet::new(),
      careers: BTreeSet::new(),
      errors: BTreeSet::new(),
      files: BTreeSet::new(),
    }
  }

  pub fn metric(&self, key: &MetricKey) -> u64 {
    self.metrics.get(key).copied().unwrap_or(0)
  }

  pub fn layout_types(&self) -> BTreeMap<String, u64> {
    self
      .metrics
      .iter()
      .filter_map(|(k, v)| match k {
        MetricKey::Layout(t) => Some((t.clone(), *v)),
        _ => None,
      })
      .collect()
  }

  pub fn content_types(&self) -> BTreeMap<String, u64> {
    self
      .metrics
      .iter()
      .filter_map(|(k, v)| match k {
        MetricKey::Content(t) => Some((t.clone(), *v)),
        _ => None,
      })
      .collect()
  }

  fn merge(&mut self, other: StudentStats) {
    merge_counts(&mut self.metrics, other.metrics);
    for (subject, layouts) in other.layout_by_subject {
      merge_counts(self.layout_by_subject.entry(subject).or_default(), layouts);
    }
    self.subjects.extend(other.subjects);
    self.careers.extend(other.careers);
    self.errors.extend(other.errors);
    self.files.extend(other.files);
  }
}

/// A question kept as a sample for its subject. Ordered by provenance, so the
/// smallest samples across all partials are the ones that survive a merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSample {
  pub student: String,
  pub source_file: String,
  pub line: usize,
  pub question_ref: String,
  pub grade: Grade,
  pub question_type: String,
  pub text: String,
  pub visual: String,
}

/// Students of one grade band and their combined layout counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandRollup {
  pub students: BTreeSet<String>,
  pub layout_preference: BTreeMap<String, u64>,
  /// subject -> layout type -> count
  pub subjects: BTreeMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
  pub layout_distribution: BTreeMap<String, u64>,
  pub content_distribution: BTreeMap<String, u64>,
  /// practice batch size -> number of batches
  pub practice_question_counts: BTreeMap<usize, u64>,
  /// Findings per kind, kept in canonical (sorted) order.
  pub issues_by_kind: BTreeMap<IssueKind, Vec<Finding>>,
  pub stats_by_student: BTreeMap<String, StudentStats>,
  pub files_analyzed: u64,
  pub malformed_entries: u64,
  pub skipped_files: BTreeSet<SkippedFile>,
  /// subject -> at most `SAMPLES_PER_SUBJECT` questions
  pub question_samples: BTreeMap<String, BTreeSet<QuestionSample>>,
}

impl AggregateState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pure reducer form of `apply`.
  pub fn fold(mut self, observation: Observation) -> Self {
    self.apply(observation);
    self
  }

  pub fn apply(&mut self, observation: Observation) {
    match observation {
      Observation::Event(event) => self.apply_event(event),
      Observation::Finding(finding) => self.apply_finding(finding),
      Observation::Metric { student, key } => {
        bump(&mut self.student(&student).metrics, key, 1);
      }
      Observation::Malformed { student, count } => {
        self.student(&student);
        self.malformed_entries += count as u64;
      }
      Observation::FileAnalyzed { student, path } => {
        self.student(&student).files.insert(path);
        self.files_analyzed += 1;
      }
      Observation::FileSkipped { path, reason } => {
        self.skipped_files.insert(SkippedFile { path, reason });
      }
    }
  }

  /// Combine two partial aggregates.
  pub fn merge(mut self, other: AggregateState) -> Self {
    merge_counts(&mut self.layout_distribution, other.layout_distribution);
    merge_counts(&mut self.content_distribution, other.content_distribution);
    merge_counts(&mut self.practice_question_counts, other.practice_question_counts);

    for (kind, findings) in other.issues_by_kind {
      let list = self.issues_by_kind.entry(kind).or_default();
      list.extend(findings);
      list.sort();
    }

    for (student, stats) in other.stats_by_student {
      match self.stats_by_student.get_mut(&student) {
        Some(existing) => existing.merge(stats),
        None => {
          self.stats_by_student.insert(student, stats);
        }
      }
    }

    self.files_analyzed += other.files_analyzed;
    self.malformed_entries += other.malformed_entries;
    self.skipped_files.extend(other.skipped_files);
    for (subject, samples) in other.question_samples {
      for sample in samples {
        self.add_sample(subject.clone(), sample);
      }
    }
    self
  }

  fn add_sample(&mut self, subject: String, sample: QuestionSample) {
    let samples = self.question_samples.entry(subject).or_default();
    samples.insert(sample);
    while samples.len() > SAMPLES_PER_SUBJECT {
      samples.pop_last();
    }
  }

  fn student(&mut self, student: &str) -> &mut StudentStats {
    self
      .stats_by_student
      .entry(student.to_string())
      .or_insert_with(|| StudentStats::new(student))
  }

  fn apply_event(&mut self, event: Event) {
    match event.kind {
      EventKind::LayoutDecision => {
        if let Some(subject) = event.field("subject") {
          let subject = subject.to_string();
          self.student(&event.source_student).subjects.insert(subject);
        }
        let subject = event.field("subject").unwrap_or(UNKNOWN).to_string();
        if let Some(layout) = event.field("layoutType") {
          bump(&mut self.layout_distribution, layout.to_string(), 1);
          let stats = self.student(&event.source_student);
          bump(&mut stats.metrics, MetricKey::Layout(layout.to_string()), 1);
          bump(
            stats.layout_by_subject.entry(subject).or_default(),
            layout.to_string(),
            1,
          );
        }
        if let Some(content) = event.field("contentType") {
          bump(&mut self.content_distribution, content.to_string(), 1);
          let stats = self.student(&event.source_student);
          bump(&mut stats.metrics, MetricKey::Content(content.to_string()), 1);
        }
      }
      EventKind::PracticeBatch => {
        let size: usize = event
          .field("size")
          .and_then(|s| s.parse().ok())
          .unwrap_or(0);
        // One batch can be reported three ways; each origin feeds one counter.
        match event.field("origin") {
          Some("jit") => {
            let stats = self.student(&event.source_student);
            bump(&mut stats.metrics, MetricKey::PracticeBatches, 1);
            bump(&mut stats.metrics, MetricKey::PracticeQuestions, size as u64);
          }
          Some("rendered") => bump(&mut self.practice_question_counts, size, 1),
          _ => {
            self.student(&event.source_student);
          }
        }
      }
      EventKind::QuestionRecord => {
        let stats = self.student(&event.source_student);
        bump(&mut stats.metrics, MetricKey::Questions, 1);
        let Some(question) = event.question else {
          return;
        };
        if let Some(subject) = &question.subject {
          stats.subjects.insert(subject.clone());
        }
        let subject = question.subject.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let sample = QuestionSample {
          student: event.source_student,
          source_file: event.source_file,
          line: event.line,
          question_ref: question.ordinal.to_string(),
          grade: question.grade,
          question_type: question.question_type,
          text: question.text,
          visual: question.visual,
        };
        self.add_sample(subject, sample);
      }
      EventKind::SubjectMarker => {
        if let Some(subject) = event.field("subject") {
          let subject = subject.to_string();
          self.student(&event.source_student).subjects.insert(subject);
        }
      }
      EventKind::CareerMarker => {
        if let Some(career) = event.field("career") {
          let career = career.to_string();
          self.student(&event.source_student).careers.insert(career);
        }
      }
      EventKind::RawErrorToken => {
        let stats = self.student(&event.source_student);
        if event.field("source") == Some("runtime") {
          if let Some(token) = event.field("token") {
            stats.errors.insert(token.to_string());
          }
          bump(&mut stats.metrics, MetricKey::Errors, 1);
        }
      }
    }
  }

  fn apply_finding(&mut self, finding: Finding) {
    bump(
      &mut self.student(&finding.student).metrics,
      MetricKey::Issue(finding.issue_kind),
      1,
    );
    let list = self.issues_by_kind.entry(finding.issue_kind).or_default();
    let pos = list.partition_point(|f| f <= &finding);
    list.insert(pos, finding);
  }

  // -------------------------------------------------------------------------
  // Derived views
  // -------------------------------------------------------------------------

  pub fn total_layout_decisions(&self) -> u64 {
    crate::stats::total(&self.layout_distribution)
  }

  pub fn findings(&self) -> impl Iterator<Item = &Finding> {
    self.issues_by_kind.values().flatten()
  }

  pub fn findings_for<'a>(&'a self, student: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
    self.findings().filter(move |f| f.student == student)
  }

  pub fn count(&self, kind: IssueKind) -> usize {
    self.issues_by_kind.get(&kind).map_or(0, Vec::len)
  }

  /// subject -> issue kind -> finding count
  pub fn issues_by_subject(&self) -> BTreeMap<String, BTreeMap<IssueKind, u64>> {
    let mut counts: BTreeMap<String, BTreeMap<IssueKind, u64>> = BTreeMap::new();
    for finding in self.findings() {
      bump(counts.entry(finding.subject.clone()).or_default(), finding.issue_kind, 1);
    }
    counts
  }

  pub fn severity_counts(&self) -> BTreeMap<Severity, u64> {
    let mut counts = BTreeMap::new();
    for (kind, findings) in &self.issues_by_kind {
      bump(&mut counts, kind.severity(), findings.len() as u64);
    }
    counts
  }

  /// Students and layout counts per grade band. Known bands are always present;
  /// `Unknown` only when some student's grade did not resolve.
  pub fn grade_bands(&self, config: &Config) -> BTreeMap<GradeBand, BandRollup> {
    let mut bands: BTreeMap<GradeBand, BandRollup> = GradeBand::KNOWN
      .iter()
      .map(|b| (*b, BandRollup::default()))
      .collect();

    for (student, stats) in &self.stats_by_student {
      let rollup = bands.entry(grade::band(stats.grade, config)).or_default();
      rollup.students.insert(student.clone());
      merge_counts(&mut rollup.layout_preference, stats.layout_types());
      for (subject, layouts) in &stats.layout_by_subject {
        merge_counts(
          rollup.subjects.entry(subject.clone()).or_default(),
          layouts.clone(),
        );
      }
    }
    bands
  }
}
