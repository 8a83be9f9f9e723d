//! Engine configuration with sane defaults.
//!
//! Every field has a default, so a JSON config file only needs the keys it overrides.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// A layout/content pairing that is flagged as a poor fit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LayoutMismatch {
  pub layout_type: String,
  pub content_type: String,
}

/// Tunable thresholds and vocabularies for classification and reporting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Practice questions expected per batch.
  pub expected_practice_count: usize,
  /// Highest grade in the K-2 band.
  pub early_band_max: u8,
  /// Highest grade in the 3-8 band.
  pub middle_band_max: u8,
  /// Highest grade in the 9-12 band.
  pub high_band_max: u8,
  /// Findings shown per student and issue kind in the text report.
  pub preview_limit: usize,
  /// Visual value meaning "no visual".
  pub placeholder_visual: String,
  /// Minimum length of an all-caps word to count as an artifact.
  pub uppercase_min_run: usize,
  /// All-caps words that are intentional.
  pub uppercase_allow: Vec<String>,
  pub math_terms: Vec<String>,
  pub ela_terms: Vec<String>,
  /// Career name -> glyphs that must not appear in its visuals.
  pub career_disallowed_glyphs: BTreeMap<String, Vec<String>>,
  /// Object named in question text -> glyph its visual must contain.
  pub object_glyphs: BTreeMap<String, String>,
  pub layout_mismatches: Vec<LayoutMismatch>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      expected_practice_count: 5,
      early_band_max: 2,
      middle_band_max: 8,
      high_band_max: 12,
      preview_limit: 3,
      placeholder_visual: "❓".into(),
      uppercase_min_run: 4,
      uppercase_allow: vec!["LEARN".into()],
      math_terms: strings(&[
        "number", "counting", "how many", "add", "subtract", "first", "second", "third",
      ]),
      ela_terms: strings(&[
        "consonant", "vowel", "letter", "uppercase", "lowercase", "word", "sentence",
      ]),
      career_disallowed_glyphs: BTreeMap::from([("Coach".to_string(), vec!["🛠".to_string()])]),
      object_glyphs: BTreeMap::from([("whistle".to_string(), "📣".to_string())]),
      layout_mismatches: vec![
        LayoutMismatch {
          layout_type: "vertical".into(),
          content_type: "numeric".into(),
        },
        LayoutMismatch {
          layout_type: "grid-4".into(),
          content_type: "longText".into(),
        },
      ],
    }
  }
}

impl Config {
  /// Load a JSON config file; keys it omits keep their defaults.
  pub fn from_file(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| EngineError::config(path, e.to_string()))?;
    let config: Config =
      serde_json::from_str(&raw).map_err(|e| EngineError::config(path, e.to_string()))?;
    config.validate(path)?;
    Ok(config)
  }

  fn validate(&self, path: &Path) -> Result<(), EngineError> {
    if !(self.early_band_max < self.middle_band_max && self.middle_band_max < self.high_band_max) {
      return Err(EngineError::config(
        path,
        "grade bands must be strictly increasing",
      ));
    }
    if self.uppercase_min_run < 2 {
      return Err(EngineError::config(path, "uppercase_min_run must be >= 2"));
    }
    Ok(())
  }
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}
