//! Core paper types: papers, authors, affiliations and partial publication dates.
//!
//! A [`Paper`] is built once per remote record by the [`parser`](crate::parser) and owns its
//! [`Author`]s, which in turn own their [`Affiliation`] strings. Nothing is shared between
//! papers or between authors of the same paper: an affiliation listed once in the source and
//! referenced by three authors becomes three independent copies.
//!
//! Classification happens exactly once, by consuming a [`Paper`] into a [`ClassifiedPaper`].
//! After that the values are never mutated.
//!
//! # Examples
//!
//! ```
//! use pharmalit::{
//!   classifier::Classifier,
//!   paper::{Author, Paper},
//! };
//!
//! let paper = Paper {
//!   pmid:                       "12345".to_string(),
//!   title:                      "Test Paper".to_string(),
//!   title_missing:              false,
//!   publication_date:           "2023-01-15".parse().unwrap(),
//!   authors:                    vec![Author::new("John Smith").with_affiliation("Pfizer Inc.")],
//!   corresponding_author_email: None,
//! };
//!
//! let classified = paper.classify(&Classifier::default());
//! assert!(classified.has_pharma_authors);
//! assert_eq!(classified.non_academic_authors, vec!["John Smith"]);
//! ```

use super::*;

/// Sentinel displayed for a publication date the source did not supply.
pub const UNKNOWN_DATE: &str = "unknown";

/// A publication record from the remote literature database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
  /// PubMed identifier, never empty
  pub pmid:                       String,
  /// Full title with inline markup flattened; empty when the source had none
  pub title:                      String,
  /// Set when the source record carried no title node at all
  #[serde(default)]
  pub title_missing:              bool,
  /// Publication date at whatever precision the source supplied
  pub publication_date:           PublicationDate,
  /// Authors in the order the source lists them
  pub authors:                    Vec<Author>,
  /// Contact email of the corresponding author, if the source marks one
  pub corresponding_author_email: Option<String>,
}

/// A single author of a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
  /// Name as supplied, usually "First Last" or a collective/group name
  pub name:             String,
  /// Affiliations attached to this author, in source order
  pub affiliations:     Vec<Affiliation>,
  /// Explicit contact email, if any
  pub email:            Option<String>,
  /// Whether the source flags this author as the contact author
  pub is_corresponding: bool,
}

/// One free-text affiliation of an author.
///
/// The raw text is kept verbatim. The derived fields live in [`Affiliation::classification`]
/// and are filled in by [`Paper::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
  /// Raw affiliation text as supplied by the source
  pub raw:            String,
  /// Derived classification; `None` until the paper is classified
  #[serde(default)]
  pub classification: Option<Classification>,
}

/// Publication date with the precision the source supplied.
///
/// PubMed frequently publishes only a year or a year and month. The partial form is kept for
/// display, while [`PublicationDate::canonical`] fills the missing parts with the first of the
/// unit when a calendar date is required.
///
/// # Examples
///
/// ```
/// use pharmalit::paper::PublicationDate;
///
/// let date: PublicationDate = "2023 Jan".parse().unwrap();
/// assert_eq!(date.to_string(), "2023-01");
/// assert_eq!(date.canonical().unwrap().to_string(), "2023-01-01");
///
/// let date: PublicationDate = "".parse().unwrap();
/// assert_eq!(date.to_string(), "unknown");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PublicationDate {
  /// Full year, month and day
  Day(NaiveDate),
  /// Year and month only
  Month {
    /// Calendar year
    year:  i32,
    /// Month number, 1 through 12
    month: u32,
  },
  /// Year only
  Year(i32),
  /// No usable date in the source
  Unknown,
}

/// A paper together with the classification of every affiliation and its aggregate flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedPaper {
  /// The classified paper; every affiliation carries a classification
  pub paper:                Paper,
  /// True iff at least one affiliation classifies as non-academic
  pub has_pharma_authors:   bool,
  /// Names of authors with at least one non-academic affiliation, in author order
  pub non_academic_authors: Vec<String>,
  /// Distinct company names, in the order they first appear
  pub company_affiliations: Vec<String>,
  /// Number of authors on the paper
  pub total_authors:        usize,
}

impl Paper {
  /// Classifies every affiliation of every author and derives the aggregate flags.
  ///
  /// Consumes the paper: after this call the model is frozen inside the returned
  /// [`ClassifiedPaper`].
  pub fn classify(mut self, classifier: &Classifier) -> ClassifiedPaper {
    for author in &mut self.authors {
      for affiliation in &mut author.affiliations {
        affiliation.classification = Some(classifier.classify(&affiliation.raw));
      }
    }

    let non_academic_authors: Vec<String> = self
      .authors
      .iter()
      .filter(|author| author.has_non_academic_affiliation())
      .map(|author| author.name.clone())
      .fold(Vec::new(), |mut names, name| {
        if !names.contains(&name) {
          names.push(name);
        }
        names
      });

    let mut company_affiliations: Vec<String> = Vec::new();
    for company in self.authors.iter().flat_map(Author::companies) {
      if !company_affiliations.iter().any(|c| c == company) {
        company_affiliations.push(company.to_string());
      }
    }

    ClassifiedPaper {
      has_pharma_authors: !non_academic_authors.is_empty(),
      non_academic_authors,
      company_affiliations,
      total_authors: self.authors.len(),
      paper: self,
    }
  }

  /// The corresponding author, if the source marks one.
  pub fn corresponding_author(&self) -> Option<&Author> {
    self.authors.iter().find(|author| author.is_corresponding)
  }
}

impl Author {
  /// Creates an author with no affiliations.
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), affiliations: Vec::new(), email: None, is_corresponding: false }
  }

  /// Appends an unclassified affiliation.
  pub fn with_affiliation(mut self, raw: impl Into<String>) -> Self {
    self.affiliations.push(Affiliation::new(raw));
    self
  }

  /// Whether any affiliation has been classified as non-academic.
  pub fn has_non_academic_affiliation(&self) -> bool {
    self.affiliations.iter().any(|affiliation| !affiliation.is_academic())
  }

  /// Company names extracted from this author's non-academic affiliations.
  pub fn companies(&self) -> impl Iterator<Item = &str> + '_ {
    self.affiliations.iter().filter_map(Affiliation::company_name)
  }
}

impl Affiliation {
  /// Wraps a raw affiliation string.
  pub fn new(raw: impl Into<String>) -> Self { Self { raw: raw.into(), classification: None } }

  /// Academic unless classified otherwise.
  ///
  /// An unclassified affiliation counts as academic so that missing data never produces a
  /// non-academic flag.
  pub fn is_academic(&self) -> bool {
    self.classification.as_ref().map_or(true, |c| c.is_academic)
  }

  /// The extracted company name, for non-academic affiliations.
  pub fn company_name(&self) -> Option<&str> {
    self.classification.as_ref().and_then(|c| c.company_name.as_deref())
  }

  /// Email addresses embedded in the raw text.
  pub fn emails(&self) -> Vec<String> { classifier::extract_emails(&self.raw) }
}

impl PublicationDate {
  /// Builds a date from separately supplied components, keeping as much precision as is valid.
  ///
  /// The month may be numeric (`"01"`, `"1"`) or an English name or abbreviation (`"Jan"`).
  pub fn from_parts(year: Option<&str>, month: Option<&str>, day: Option<&str>) -> Self {
    let Some(year) = year.and_then(parse_year) else {
      return PublicationDate::Unknown;
    };
    let Some(month) = month.and_then(parse_month) else {
      return PublicationDate::Year(year);
    };
    day
      .and_then(|d| d.trim().parse::<u32>().ok())
      .and_then(|d| NaiveDate::from_ymd_opt(year, month, d))
      .map_or(PublicationDate::Month { year, month }, PublicationDate::Day)
  }

  /// Calendar date with missing month/day set to the first of the unit.
  pub fn canonical(&self) -> Option<NaiveDate> {
    match *self {
      PublicationDate::Day(date) => Some(date),
      PublicationDate::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
      PublicationDate::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1),
      PublicationDate::Unknown => None,
    }
  }

  /// Year of publication, if known.
  pub fn year(&self) -> Option<i32> { self.canonical().map(|date| date.year()) }

  /// Whether the source supplied a full year-month-day date.
  pub fn is_complete(&self) -> bool { matches!(self, PublicationDate::Day(_)) }
}

impl Default for PublicationDate {
  fn default() -> Self { PublicationDate::Unknown }
}

impl Display for PublicationDate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PublicationDate::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
      PublicationDate::Month { year, month } => write!(f, "{year:04}-{month:02}"),
      PublicationDate::Year(year) => write!(f, "{year:04}"),
      PublicationDate::Unknown => write!(f, "{UNKNOWN_DATE}"),
    }
  }
}

impl FromStr for PublicationDate {
  type Err = PharmalitError;

  /// Parses `YYYY-MM-DD`, `YYYY MM DD`, `YYYY/MM/DD`, their year-month and year-only forms,
  /// and PubMed style `2023 Jan 15` / `2023 Jan-Feb` dates. Empty input and the `unknown`
  /// sentinel give [`PublicationDate::Unknown`]; text without a leading year is an error.
  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case(UNKNOWN_DATE) {
      return Ok(PublicationDate::Unknown);
    }
    let mut parts =
      s.split(|c: char| c == '-' || c == '/' || c.is_whitespace()).filter(|p| !p.is_empty());
    let year = parts.next();
    if year.and_then(parse_year).is_none() {
      return Err(PharmalitError::Config(format!("Unrecognized publication date: {s}")));
    }
    Ok(PublicationDate::from_parts(year, parts.next(), parts.next()))
  }
}

impl From<PublicationDate> for String {
  fn from(date: PublicationDate) -> Self { date.to_string() }
}

impl TryFrom<String> for PublicationDate {
  type Error = PharmalitError;

  fn try_from(value: String) -> Result<Self> { value.parse() }
}

/// Parses a four digit year.
fn parse_year(s: &str) -> Option<i32> {
  let s = s.trim();
  if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
    s.parse().ok()
  } else {
    None
  }
}

/// Parses a month given as a number or as an English (abbreviated) name.
fn parse_month(s: &str) -> Option<u32> {
  const MONTHS: [&str; 12] =
    ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];

  let s = s.trim();
  if let Ok(n) = s.parse::<u32>() {
    return (1..=12).contains(&n).then_some(n);
  }
  let lower = s.to_ascii_lowercase();
  if lower.len() < 3 {
    return None;
  }
  MONTHS.iter().position(|m| lower.starts_with(m)).map(|i| i as u32 + 1)
}
