//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Filter comes from `RUST_LOG`, defaulting to `info`.
///
/// Logs go to stderr so the text report on stdout stays clean.
pub fn init_logging(json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

  if json {
    builder.json().flatten_event(true).init();
  } else {
    builder.with_target(false).init();
  }
}
