//! Quality engine for layout-testing logs: deterministic, rule-based.
//!
//! Extracts layout decisions, practice batches and question records from raw
//! test-run logs, classifies content-quality issues by severity, aggregates
//! per student, subject and grade band, and renders a text report and a JSON export.
//!
//! No network, no DB; pure computation over files read once.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod discover;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod grade;
pub mod logging;
pub mod normalize;
pub mod report;
pub mod stats;
pub mod types;

pub use aggregate::{AggregateState, Observation};
pub use config::Config;
pub use engine::{Engine, LogSource};
pub use error::EngineError;
pub use report::{Export, render_text};
pub use types::{Event, EventKind, Finding, IssueKind, Severity};
