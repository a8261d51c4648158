//! Command line front end for `pharmalit`.
//!
//! `get-papers-list` runs a PubMed query and lists the papers that have at least one author
//! affiliated with a pharmaceutical or biotech company, along with those authors and the
//! companies they work for.
//!
//! # Usage
//!
//! ```bash
//! # Print matching papers to the console
//! get-papers-list "cancer immunotherapy"
//!
//! # Write them to a CSV file
//! get-papers-list "adaptive design AND oncology" -f results.csv
//!
//! # Fetch up to 500 results, keep academic-only papers too, print JSON
//! get-papers-list "CRISPR" -m 500 --all --format json
//! ```
//!
//! Settings are read from the per-user configuration file when it exists, or from the file
//! given with `--config`. An NCBI API key raises the allowed request rate and is taken from
//! `--api-key` or the `NCBI_API_KEY` environment variable. Ctrl-C stops the search before
//! its next batch and keeps the papers fetched so far; a second Ctrl-C exits immediately.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{path::PathBuf, process::ExitCode};

use clap::{builder::ArgAction, Parser, ValueEnum};
use console::style;
use pharmalit::{
  config::PharmalitConfig,
  error::PharmalitError,
  export::{self, CSV_HEADERS},
  fetcher::{CancelHandle, Fetcher, SearchReport},
  paper::ClassifiedPaper,
};
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

pub mod error;
pub mod interaction;
pub mod search;

use crate::{error::*, interaction::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";
/// Continuation line under a paper heading
static CONTINUE_PREFIX: &str = "│  ";

/// How results are printed when no output file is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
  /// One block per paper, printed as batches arrive
  #[default]
  Table,
  /// CSV with a header line
  Csv,
  /// A JSON array of rows
  Json,
}

/// Command line interface configuration and argument parsing
#[derive(Parser, Debug)]
#[command(
  name = "get-papers-list",
  author,
  version,
  about = "Fetch PubMed papers with authors from pharmaceutical or biotech companies",
  after_help = format!(
    "Settings are read from {} when it exists.",
    PharmalitConfig::default_path().display()
  )
)]
pub struct Cli {
  /// PubMed query, using the full PubMed syntax
  pub query: String,

  /// Write results to this file as CSV (JSON with `--format json`) instead of printing them
  #[arg(short, long, value_name = "FILE")]
  pub file: Option<PathBuf>,

  /// Print debug information during execution
  #[arg(short, long)]
  pub debug: bool,

  /// Maximum number of results to fetch; zero or less fetches nothing
  #[arg(short, long, default_value_t = 100, value_name = "N", allow_negative_numbers = true)]
  pub max_results: i64,

  /// Keep papers without any non-academic author
  #[arg(long)]
  pub all: bool,

  /// Output format for printed results
  #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
  pub format: OutputFormat,

  /// Configuration file to use instead of the per-user one
  #[arg(long, value_name = "PATH")]
  pub config: Option<PathBuf>,

  /// NCBI API key
  #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
  pub api_key: Option<String>,

  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging verbosity"
    )]
  pub verbose: u8,
}

impl Cli {
  /// The requested result count, with negative values read as zero.
  pub fn result_limit(&self) -> usize {
    usize::try_from(self.max_results.max(0)).unwrap_or(usize::MAX)
  }

  /// Logging verbosity; `--debug` is at least `-vvv`.
  pub fn verbosity(&self) -> u8 {
    if self.debug {
      self.verbose.max(3)
    } else {
      self.verbose
    }
  }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// `RUST_LOG` overrides the level. Logs go to stderr so they never mix with CSV or JSON on
/// stdout.
fn setup_logging(verbosity: u8) {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true)
    .init();
}

/// Entry point for the `get-papers-list` CLI application
///
/// Parses arguments, sets up logging and runs the search. Any error ends the process with a
/// failure exit code after being printed to stderr.
#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  setup_logging(cli.verbosity());
  trace!("{cli:?}");

  let terminal = Terminal::new(cli.format);
  match search::run(&terminal, &cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      let _ = terminal.reply(ResponseContent::Error(e));
      ExitCode::FAILURE
    },
  }
}
