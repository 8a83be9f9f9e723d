//! Grade resolution from student identifiers and grade-band mapping.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::types::{Grade, GradeBand, UNKNOWN};

static GRADE_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"grade[-_ ]?(k|\d{1,2})\b").expect("grade tag regex"));

/// Resolve a student's grade from its identifier.
///
/// Tried in order:
/// - last `-`/`_` separated token: `k`, `kindergarten`, or `0..=12` (`sam-k`, `taylor-10`)
/// - a `grade<N>` / `grade-k` tag anywhere (`grade7-jordan`)
///
/// Anything else is `Grade::Unknown`.
pub fn resolve(student: &str) -> Grade {
  let lower = student.trim().to_ascii_lowercase();

  if let Some(grade) = lower.rsplit(['-', '_']).next().and_then(parse_token) {
    return grade;
  }

  GRADE_TAG
    .captures(&lower)
    .and_then(|caps| caps.get(1))
    .and_then(|m| parse_token(m.as_str()))
    .unwrap_or(Grade::Unknown)
}

fn parse_token(token: &str) -> Option<Grade> {
  match token {
    "k" | "kindergarten" => Some(Grade::Kindergarten),
    _ => {
      let n: u8 = token.parse().ok()?;
      match n {
        0 => Some(Grade::Kindergarten),
        1..=12 => Some(Grade::Level(n)),
        _ => None,
      }
    }
  }
}

/// Map a grade onto its band using the configured upper bounds.
pub fn band(grade: Grade, config: &Config) -> GradeBand {
  match grade.number() {
    Some(n) if n <= config.early_band_max => GradeBand::Early,
    Some(n) if n <= config.middle_band_max => GradeBand::Middle,
    Some(n) if n <= config.high_band_max => GradeBand::High,
    _ => GradeBand::Unknown,
  }
}

/// Human label for a band, e.g. `K-2`, `3-8`, `9-12`.
pub fn band_label(band: GradeBand, config: &Config) -> String {
  match band {
    GradeBand::Early => format!("K-{}", config.early_band_max),
    GradeBand::Middle => format!("{}-{}", config.early_band_max + 1, config.middle_band_max),
    GradeBand::High => format!("{}-{}", config.middle_band_max + 1, config.high_band_max),
    GradeBand::Unknown => UNKNOWN.to_string(),
  }
}
