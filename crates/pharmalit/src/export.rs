//! Output rows for classified papers: CSV, plain text and JSON.
//!
//! Every format is built from the same [`PaperRow`]: one line per paper with list fields
//! joined by [`LIST_SEPARATOR`] and a missing corresponding email shown as [`NOT_AVAILABLE`].
//!
//! ```
//! use pharmalit::{
//!   classifier::Classifier,
//!   export::{write_csv, CSV_HEADERS},
//!   paper::{Author, Paper, PublicationDate},
//! };
//!
//! let paper = Paper {
//!   pmid:                       "1".into(),
//!   title:                      "Adaptive trials".into(),
//!   title_missing:              false,
//!   publication_date:           PublicationDate::Year(2024),
//!   authors:                    vec![Author::new("Scott Berry").with_affiliation("Berry Consultants")],
//!   corresponding_author_email: None,
//! }
//! .classify(&Classifier::default());
//!
//! let mut out = Vec::new();
//! write_csv(&mut out, [&paper])?;
//! let csv = String::from_utf8(out).unwrap();
//! assert!(csv.starts_with(&CSV_HEADERS.join(",")));
//! assert!(csv.contains("1,Adaptive trials,2024,Scott Berry,Berry Consultants,N/A"));
//! # Ok::<(), pharmalit::error::PharmalitError>(())
//! ```

use std::io::Write;

use super::*;

/// CSV column headers, in column order.
pub const CSV_HEADERS: [&str; 6] = [
  "PubmedID",
  "Title",
  "Publication Date",
  "Non-academic Author(s)",
  "Company Affiliation(s)",
  "Corresponding Author Email",
];

/// Separator for list-valued fields.
pub const LIST_SEPARATOR: &str = "; ";

/// Placeholder for a missing corresponding author email.
pub const NOT_AVAILABLE: &str = "N/A";

/// One exported paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperRow {
  /// Paper identifier
  pub pubmed_id:                  String,
  /// Title, empty when the record had none
  pub title:                      String,
  /// Publication date at its source precision
  pub publication_date:           String,
  /// Names of non-academic authors, joined
  pub non_academic_authors:       String,
  /// Distinct company names, joined
  pub company_affiliations:       String,
  /// Corresponding author email or [`NOT_AVAILABLE`]
  pub corresponding_author_email: String,
  /// Number of authors; not a CSV column
  pub total_authors:              usize,
  /// Whether any author is non-academic; not a CSV column
  pub has_pharma_authors:         bool,
}

impl From<&ClassifiedPaper> for PaperRow {
  fn from(classified: &ClassifiedPaper) -> Self {
    let paper = &classified.paper;
    Self {
      pubmed_id:                  paper.pmid.clone(),
      title:                      paper.title.clone(),
      publication_date:           paper.publication_date.to_string(),
      non_academic_authors:       classified.non_academic_authors.join(LIST_SEPARATOR),
      company_affiliations:       classified.company_affiliations.join(LIST_SEPARATOR),
      corresponding_author_email: paper
        .corresponding_author_email
        .clone()
        .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
      total_authors:              classified.total_authors,
      has_pharma_authors:         classified.has_pharma_authors,
    }
  }
}

impl PaperRow {
  /// CSV field values in [`CSV_HEADERS`] order.
  pub fn values(&self) -> [&str; 6] {
    [
      self.pubmed_id.as_str(),
      self.title.as_str(),
      self.publication_date.as_str(),
      self.non_academic_authors.as_str(),
      self.company_affiliations.as_str(),
      self.corresponding_author_email.as_str(),
    ]
  }
}

/// Writes papers as CSV with a header line.
pub fn write_csv<'a, W: Write>(
  writer: W,
  papers: impl IntoIterator<Item = &'a ClassifiedPaper>,
) -> Result<()> {
  let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
  csv.write_record(CSV_HEADERS)?;
  for paper in papers {
    csv.write_record(PaperRow::from(paper).values())?;
  }
  csv.flush()?;
  Ok(())
}

/// Writes papers to a CSV file, replacing it if it exists.
pub fn write_csv_file<'a>(
  path: impl AsRef<Path>,
  papers: impl IntoIterator<Item = &'a ClassifiedPaper>,
) -> Result<()> {
  let path = path.as_ref();
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)?;
  }
  write_csv(std::fs::File::create(path)?, papers)?;
  debug!("wrote {}", path.display());
  Ok(())
}

/// Renders one paper as "Header: value" lines.
pub fn render_text(paper: &ClassifiedPaper) -> String {
  let row = PaperRow::from(paper);
  CSV_HEADERS
    .iter()
    .zip(row.values())
    .map(|(header, value)| format!("{header}: {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Serializes papers as a pretty-printed JSON array of rows.
pub fn to_json<'a>(papers: impl IntoIterator<Item = &'a ClassifiedPaper>) -> Result<String> {
  let rows: Vec<PaperRow> = papers.into_iter().map(PaperRow::from).collect();
  Ok(serde_json::to_string_pretty(&rows)?)
}
