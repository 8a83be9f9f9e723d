//! Binary entrypoint: analyze a test-run directory of logs.
//!
//! Prints the text report to stdout and writes the JSON export to `--output`.
//! Logs go to stderr. Exits 1 on a run-level error.

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use quality_engine::discover::{self, DEFAULT_PATTERN};
use quality_engine::logging::init_logging;
use quality_engine::{Config, Engine, EngineError, Export, render_text};

#[derive(Debug, Parser)]
#[command(name = "quality-engine", version, about = "Analyze layout-testing logs for content quality issues")]
struct Cli {
  /// Test-run directory containing one directory per student.
  root: PathBuf,

  /// Glob, relative to ROOT, selecting log files.
  #[arg(long, default_value = DEFAULT_PATTERN)]
  pattern: String,

  /// Where to write the JSON export.
  #[arg(long, default_value = "analysis_results.json")]
  output: PathBuf,

  /// JSON config file overriding default thresholds and vocabularies.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Findings shown per student and issue kind in the text report.
  #[arg(long)]
  preview: Option<usize>,

  /// Emit logs as JSON.
  #[arg(long)]
  json_logs: bool,
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.json_logs);

  if let Err(e) = run(&cli) {
    error!(error = %e, "analysis failed");
    std::process::exit(1);
  }
}

fn run(cli: &Cli) -> Result<(), EngineError> {
  let mut config = match &cli.config {
    Some(path) => Config::from_file(path)?,
    None => Config::default(),
  };
  if let Some(preview) = cli.preview {
    config.preview_limit = preview;
  }

  let sources = discover::discover(&cli.root, &cli.pattern)?;
  info!(root = %cli.root.display(), pattern = %cli.pattern, files = sources.len(), "discovered logs");

  let engine = Engine::new(config);
  let state = engine.analyze_sources(&sources)?;

  print!("{}", render_text(&state, engine.config()));

  Export::build(&state, engine.config(), Utc::now()).write(&cli.output)?;
  info!(output = %cli.output.display(), "export written");
  Ok(())
}
