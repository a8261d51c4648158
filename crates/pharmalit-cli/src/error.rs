//! Error types for the `get-papers-list` binary.

use thiserror::Error;

use super::*;

/// Error type alias used for the CLI.
pub type Result<T> = core::result::Result<T, CliError>;

/// Errors that end a CLI run.
#[derive(Error, Debug)]
pub enum CliError {
  /// Searching, parsing or exporting failed.
  #[error(transparent)]
  Pharmalit(#[from] PharmalitError),

  /// Writing to the terminal failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl CliError {
  /// A short hint printed under the error, when one helps.
  pub fn hint(&self) -> Option<&'static str> {
    match self {
      CliError::Pharmalit(PharmalitError::InvalidQuery(_)) =>
        Some("Queries use PubMed syntax: quote phrases and balance parentheses."),
      CliError::Pharmalit(PharmalitError::SearchFailed(_)) =>
        Some("PubMed could not be reached; check the connection or try again later."),
      CliError::Pharmalit(PharmalitError::AllBatchesFailed(_)) =>
        Some("Records could not be fetched; an NCBI API key raises the request limit."),
      CliError::Pharmalit(PharmalitError::Config(_) | PharmalitError::TomlDe(_)) =>
        Some("Check the configuration file passed with --config."),
      _ => None,
    }
  }
}
