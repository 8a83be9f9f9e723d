//! Counter arithmetic: percentages, counter merges, most-common ranking.
//!
//! All counters are `BTreeMap`s so iteration order, and therefore report and
//! export output, is deterministic.

use std::collections::BTreeMap;

/// `count / total * 100`, defined as `0.0` when `total == 0`.
pub fn percentage(count: u64, total: u64) -> f64 {
  if total == 0 {
    0.0
  } else {
    count as f64 / total as f64 * 100.0
  }
}

/// Add `by` to the counter at `key`.
pub fn bump<K: Ord>(counts: &mut BTreeMap<K, u64>, key: K, by: u64) {
  *counts.entry(key).or_insert(0) += by;
}

/// Add every counter in `from` into `into`.
pub fn merge_counts<K: Ord>(into: &mut BTreeMap<K, u64>, from: BTreeMap<K, u64>) {
  for (key, count) in from {
    bump(into, key, count);
  }
}

pub fn total<K>(counts: &BTreeMap<K, u64>) -> u64 {
  counts.values().sum()
}

/// Entries sorted by count descending, ties broken by key for determinism.
pub fn most_common<K: Ord + Clone>(counts: &BTreeMap<K, u64>) -> Vec<(K, u64)> {
  let mut ranked: Vec<(K, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
  ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
  ranked
}
