//! Terminal output.
//!
//! Everything the CLI tells the user goes through [`UserInteraction::reply`]. Papers go to
//! stdout in the selected [`OutputFormat`]; status messages, reports and errors go to stderr,
//! so redirecting stdout captures clean CSV or JSON.

use std::io::Write;

use super::*;

/// Something to show the user.
#[derive(Debug)]
pub enum ResponseContent<'a> {
  /// A single paper, printed as soon as it is available
  Paper(&'a ClassifiedPaper),
  /// A complete result set
  Papers(&'a [ClassifiedPaper]),
  /// How the search went
  Report(&'a SearchReport),
  /// An operation finished
  Success(&'a str),
  /// A fatal error
  Error(CliError),
  /// A status message
  Info(&'a str),
  /// Something the user should know about
  Warning(&'a str),
}

/// Output side of the CLI.
pub trait UserInteraction {
  /// Shows `content` to the user.
  fn reply(&self, content: ResponseContent) -> Result<()>;
}

/// [`UserInteraction`] on the process's stdout and stderr.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
  /// Format for papers
  format: OutputFormat,
}

impl Terminal {
  /// Creates a terminal printing papers as `format`.
  pub fn new(format: OutputFormat) -> Self { Self { format } }

  /// Prints one paper as a heading followed by its fields.
  fn print_paper(&self, paper: &ClassifiedPaper) -> Result<()> {
    let row = export::PaperRow::from(paper);
    let mut out = std::io::stdout().lock();
    let title = if row.title.is_empty() { "(untitled)" } else { row.title.as_str() };
    writeln!(out, "{} {}", style(&row.pubmed_id).cyan().bold(), style(title).bold())?;
    for (header, value) in CSV_HEADERS.iter().zip(row.values()).skip(2) {
      let label = format!("{header}:");
      writeln!(out, "{}{} {value}", style(CONTINUE_PREFIX).dim(), style(label).dim())?;
    }
    writeln!(out)?;
    Ok(())
  }
}

impl UserInteraction for Terminal {
  fn reply(&self, content: ResponseContent) -> Result<()> {
    match content {
      ResponseContent::Paper(paper) => match self.format {
        OutputFormat::Table => self.print_paper(paper)?,
        _ => self.reply(ResponseContent::Papers(std::slice::from_ref(paper)))?,
      },
      ResponseContent::Papers(papers) => match self.format {
        OutputFormat::Table =>
          for paper in papers {
            self.print_paper(paper)?;
          },
        OutputFormat::Csv => export::write_csv(std::io::stdout().lock(), papers)?,
        OutputFormat::Json => println!("{}", export::to_json(papers)?),
      },
      ResponseContent::Report(report) =>
        if report.is_partial() {
          eprintln!("{} Partial results: {report}", style(WARNING_PREFIX).yellow());
        } else {
          eprintln!("{} {report}", style(INFO_PREFIX).blue());
        },
      ResponseContent::Success(message) => {
        eprintln!("{} {message}", style(SUCCESS_PREFIX).green());
      },
      ResponseContent::Error(error) => {
        eprintln!("{} {}", style(ERROR_PREFIX).red(), style(&error).red());
        if let Some(hint) = error.hint() {
          eprintln!("{}{}", style(CONTINUE_PREFIX).dim(), style(hint).dim());
        }
      },
      ResponseContent::Info(message) => {
        eprintln!("{} {message}", style(INFO_PREFIX).blue());
      },
      ResponseContent::Warning(message) => {
        eprintln!("{} {message}", style(WARNING_PREFIX).yellow());
      },
    }
    Ok(())
  }
}
