//! Academic vs. industry affiliation classification.
//!
//! The classifier is a pure function over a raw affiliation string. It decides whether the
//! affiliation belongs to an academic context (university, hospital, research institute) and,
//! when it does not, extracts a best-effort company name from the text.
//!
//! All decisions are driven by the ordered keyword tables in [`ClassifierTables`], which can be
//! loaded from TOML to tune the heuristic without touching code:
//!
//! ```toml
//! academic_keywords     = ["university", "hospital", "institute"]
//! academic_email_labels = ["edu", "ac"]
//! corporate_keywords    = ["inc", "ltd", "pharmaceuticals", "consultants"]
//! legal_suffixes        = ["co", "ag"]
//! strip_prefixes        = ["Dr.", "Prof."]
//! strip_phrases         = ["electronic address:"]
//! ```
//!
//! # Rules
//!
//! 1. Empty or whitespace-only text is academic with no company. Missing data never produces
//!    a non-academic flag.
//! 2. An embedded email on an academic domain (`.edu`, `.ac.uk`, `.edu.au`, ...) makes the
//!    affiliation academic, unless the free text carries a corporate marker: a corporate
//!    keyword, or a short legal suffix written after a name ("Merck & Co.", "Novartis AG").
//!    A suffix opening a segment ("Boulder, CO 80309") is an address, not a marker.
//! 3. Any academic keyword contained in the text, case-insensitively, makes the affiliation
//!    academic. Containment is literal, so "lab" also fires inside "BioLabs".
//! 4. Everything else is non-academic, and a company name is extracted.
//!
//! # Examples
//!
//! ```
//! use pharmalit::classifier::{Classifier, Confidence};
//!
//! let classifier = Classifier::default();
//!
//! let academic = classifier.classify("Department of Medicine, Harvard Medical School");
//! assert!(academic.is_academic);
//! assert_eq!(academic.company_name, None);
//!
//! let industry = classifier.classify("Pfizer Inc., New York, NY <jdoe@pfizer.com>");
//! assert!(!industry.is_academic);
//! assert_eq!(industry.company_name.as_deref(), Some("Pfizer Inc."));
//! assert_eq!(industry.confidence, Confidence::High);
//! ```

use super::*;

lazy_static! {
  /// Email addresses embedded in free text.
  static ref EMAIL: Regex =
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap();

  /// Bracket pairs left empty once an email has been cut out of them.
  static ref EMPTY_BRACKETS: Regex = Regex::new(r"[<(\[]\s*[>)\]]").unwrap();

  /// Runs of whitespace.
  static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

  /// Classifier built from [`ClassifierTables::default`].
  static ref DEFAULT_CLASSIFIER: Classifier =
    Classifier::new(ClassifierTables::default()).expect("default classifier tables compile");
}

/// Keywords that mark an affiliation as academic.
const ACADEMIC_KEYWORDS: &[&str] = &[
  "university",
  "college",
  "institute",
  "school",
  "academy",
  "medical center",
  "medical centre",
  "hospital",
  "clinic",
  "research center",
  "research centre",
  "laboratory",
  "lab",
  "department",
  "faculty",
  "professor",
  "associate professor",
  "assistant professor",
  "lecturer",
  "researcher",
  "scientist",
  "phd",
  "postdoc",
];

/// Domain labels that mark an email address as academic (`harvard.edu`, `ox.ac.uk`).
const ACADEMIC_EMAIL_LABELS: &[&str] = &["edu", "ac"];

/// Keywords that mark free text as corporate.
const CORPORATE_KEYWORDS: &[&str] = &[
  "inc",
  "incorporated",
  "ltd",
  "limited",
  "llc",
  "llp",
  "plc",
  "corp",
  "corporation",
  "company",
  "gmbh",
  "pharma",
  "pharmaceutical",
  "pharmaceuticals",
  "biopharma",
  "biopharmaceuticals",
  "biotech",
  "biotechnology",
  "bioscience",
  "biosciences",
  "therapeutics",
  "biologics",
  "diagnostics",
  "consultants",
  "consulting",
];

/// Short legal forms that double as state, province or canton codes.
const LEGAL_SUFFIXES: &[&str] = &["co", "ag", "sa", "bv", "nv", "kk"];

/// Title prefixes removed from the start of a company candidate.
const STRIP_PREFIXES: &[&str] = &[
  "Associate Professor",
  "Assistant Professor",
  "Professor",
  "Prof.",
  "Dr.",
  "Mr.",
  "Mrs.",
  "Ms.",
];

/// Phrases removed anywhere from a company candidate.
const STRIP_PHRASES: &[&str] = &["electronic address:", "e-mail:", "email:"];

/// Ordered keyword tables driving the classifier.
///
/// Every field falls back to the built-in list when absent from a TOML file, so a
/// configuration only needs to name the tables it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierTables {
  /// Matched anywhere in the text, case-insensitively
  pub academic_keywords:     Vec<String>,
  /// Email domain labels (after the first) that mark an academic address
  pub academic_email_labels: Vec<String>,
  /// Matched as whole words, case-insensitively
  pub corporate_keywords:    Vec<String>,
  /// Whole words that count as corporate only right after a name, as in "Novartis AG"
  pub legal_suffixes:        Vec<String>,
  /// Removed, repeatedly and in order, from the start of a company candidate
  pub strip_prefixes:        Vec<String>,
  /// Removed anywhere from a company candidate, case-insensitively
  pub strip_phrases:         Vec<String>,
}

/// How much trust to put in an extracted company name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  /// A segment carrying a corporate keyword was isolated from the text
  High,
  /// The name is the whole (cleaned) text, or equals the raw text
  Low,
}

/// Result of classifying one affiliation string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
  /// Whether the affiliation is academic
  pub is_academic:  bool,
  /// Extracted company name; always `None` for academic affiliations
  pub company_name: Option<String>,
  /// Email addresses embedded in the text
  pub emails:       Vec<String>,
  /// Confidence of the decision and of the company name
  pub confidence:   Confidence,
}

/// Table-driven affiliation classifier.
///
/// Building one compiles the keyword tables into regular expressions; classification itself
/// is cheap and deterministic. The type is `Clone + Send + Sync` and can be shared freely.
#[derive(Debug, Clone)]
pub struct Classifier {
  /// Tables the patterns were compiled from
  tables:            ClassifierTables,
  /// Match of any academic keyword anywhere in the text
  academic_pattern:  Option<Regex>,
  /// Whole-word match of any corporate keyword
  corporate_pattern: Option<Regex>,
  /// Legal suffix following a name token
  suffix_pattern:    Option<Regex>,
  /// Case-insensitive matches of the strip phrases
  phrase_pattern:    Option<Regex>,
}

impl Default for ClassifierTables {
  fn default() -> Self {
    let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
    Self {
      academic_keywords:     owned(ACADEMIC_KEYWORDS),
      academic_email_labels: owned(ACADEMIC_EMAIL_LABELS),
      corporate_keywords:    owned(CORPORATE_KEYWORDS),
      legal_suffixes:        owned(LEGAL_SUFFIXES),
      strip_prefixes:        owned(STRIP_PREFIXES),
      strip_phrases:         owned(STRIP_PHRASES),
    }
  }
}

impl ClassifierTables {
  /// Parses tables from a TOML string.
  pub fn from_toml_str(toml_str: &str) -> Result<Self> { Ok(toml::from_str(toml_str)?) }

  /// Reads tables from a TOML file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }
}

impl Default for Classifier {
  fn default() -> Self { DEFAULT_CLASSIFIER.clone() }
}

impl Classifier {
  /// Compiles a classifier from keyword tables.
  ///
  /// # Errors
  ///
  /// Returns [`PharmalitError::Config`] if a table compiles into a pattern the regex engine
  /// rejects (for instance one exceeding its size limit).
  pub fn new(tables: ClassifierTables) -> Result<Self> {
    let academic_pattern = keyword_pattern(&tables.academic_keywords, r"(?:", r")")?;
    let corporate_pattern = keyword_pattern(&tables.corporate_keywords, r"\b(?:", r")\b")?;
    let suffix_pattern =
      keyword_pattern(&tables.legal_suffixes, r"[\p{L}\p{N}&)]\s+(?:", r")\b")?;
    let phrase_pattern = keyword_pattern(&tables.strip_phrases, r"(?:", r")")?;
    Ok(Self { tables, academic_pattern, corporate_pattern, suffix_pattern, phrase_pattern })
  }

  /// Compiles a classifier from a TOML tables file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    Self::new(ClassifierTables::from_file(path)?)
  }

  /// The tables this classifier was built from.
  pub fn tables(&self) -> &ClassifierTables { &self.tables }

  /// Classifies one raw affiliation string.
  pub fn classify(&self, affiliation: &str) -> Classification {
    let trimmed = affiliation.trim();
    if trimmed.is_empty() {
      return Classification {
        is_academic:  true,
        company_name: None,
        emails:       Vec::new(),
        confidence:   Confidence::Low,
      };
    }

    let emails = extract_emails(trimmed);
    let free_text = normalize(&EMAIL.replace_all(trimmed, " "));
    let corporate = self.is_corporate(&free_text);

    let academic_email = emails.iter().any(|email| self.is_academic_email(email));
    if academic_email && !corporate {
      trace!(affiliation = trimmed, "academic by email domain");
      return academic(emails);
    }

    if self.academic_pattern.as_ref().is_some_and(|p| p.is_match(&free_text)) {
      trace!(affiliation = trimmed, "academic by keyword");
      return academic(emails);
    }

    let (company_name, confidence) = self.extract_company(trimmed);
    trace!(affiliation = trimmed, company = %company_name, "non-academic");
    Classification { is_academic: false, company_name: Some(company_name), emails, confidence }
  }

  /// Whether an email address sits on an academic domain.
  pub fn is_academic_email(&self, email: &str) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
      return false;
    };
    let domain = domain.to_lowercase();
    domain
      .split('.')
      .skip(1)
      .any(|label| self.tables.academic_email_labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
  }

  /// Derives a company name from non-academic affiliation text.
  ///
  /// Emails, strip phrases and title prefixes are removed; then the first comma/semicolon
  /// separated segment carrying a corporate keyword is taken, falling back to the whole
  /// cleaned text, and finally to the raw text when cleaning leaves nothing.
  fn extract_company(&self, raw: &str) -> (String, Confidence) {
    let mut cleaned = EMAIL.replace_all(raw, " ").into_owned();
    if let Some(phrases) = &self.phrase_pattern {
      cleaned = phrases.replace_all(&cleaned, " ").into_owned();
    }
    cleaned = EMPTY_BRACKETS.replace_all(&cleaned, " ").into_owned();
    cleaned = WHITESPACE.replace_all(cleaned.trim(), " ").into_owned();
    let cleaned = self.strip_prefixes(&cleaned);

    let segments: Vec<&str> = cleaned.split([',', ';']).map(trim_punctuation).collect();
    let found = segments.iter().position(|segment| self.is_corporate(segment));

    let (name, via_keyword) = match found {
      // "Genentech, Inc." keeps the name in front of a bare legal suffix
      Some(at) if at > 0 && self.is_bare_suffix(segments[at]) && !segments[at - 1].is_empty() =>
        (format!("{}, {}", segments[at - 1], segments[at]), true),
      Some(at) if !segments[at].is_empty() => (segments[at].to_string(), true),
      _ => (trim_punctuation(cleaned).to_string(), false),
    };

    if name.is_empty() {
      return (raw.to_string(), Confidence::Low);
    }
    let confidence =
      if via_keyword && name != raw { Confidence::High } else { Confidence::Low };
    (name, confidence)
  }

  /// Whether text carries a corporate keyword or a legal suffix after a name.
  fn is_corporate(&self, text: &str) -> bool {
    let text = text.to_lowercase();
    self.corporate_pattern.as_ref().is_some_and(|p| p.is_match(&text))
      || self.suffix_pattern.as_ref().is_some_and(|p| p.is_match(&text))
  }

  /// Whether a segment is nothing but corporate keywords, like "Inc." or "Co. KG".
  fn is_bare_suffix(&self, segment: &str) -> bool {
    self.corporate_pattern.as_ref().is_some_and(|p| {
      p.replace_all(&segment.to_lowercase(), "").chars().all(|c| !c.is_alphanumeric())
    })
  }

  /// Removes configured prefixes from the start of `text` until none applies.
  fn strip_prefixes<'a>(&self, mut text: &'a str) -> &'a str {
    loop {
      let stripped = self.tables.strip_prefixes.iter().find_map(|prefix| {
        let head = text.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix).then(|| {
          text[prefix.len()..].trim_start_matches(|c: char| c == ',' || c.is_whitespace())
        })
      });
      match stripped {
        Some(rest) if rest.len() < text.len() => text = rest,
        _ => return text,
      }
    }
  }
}

/// Extracts every email address embedded in `text`, in order of appearance.
///
/// ```
/// use pharmalit::classifier::extract_emails;
///
/// let emails = extract_emails("Contact: john@example.com, jane@test.org");
/// assert_eq!(emails, vec!["john@example.com", "jane@test.org"]);
/// ```
pub fn extract_emails(text: &str) -> Vec<String> {
  EMAIL.find_iter(text).map(|m| m.as_str().trim_end_matches('.').to_string()).collect()
}

/// Lowercases, trims and collapses internal whitespace.
pub fn normalize(text: &str) -> String { WHITESPACE.replace_all(text.trim(), " ").to_lowercase() }

/// Academic result carrying the emails found in the text.
fn academic(emails: Vec<String>) -> Classification {
  Classification { is_academic: true, company_name: None, emails, confidence: Confidence::High }
}

/// Trims separators and brackets from both ends, keeping a period that directly follows the
/// last word (as in "Inc.").
fn trim_punctuation(text: &str) -> &str {
  let is_separator = |c: char| c.is_whitespace() || ",;:.-()[]<>\"'".contains(c);
  let text = text.trim_start_matches(is_separator);
  let trimmed = text.trim_end_matches(is_separator);
  if text[trimmed.len()..].starts_with('.') && !trimmed.is_empty() {
    &text[..=trimmed.len()]
  } else {
    trimmed
  }
}

/// Compiles a case-insensitive alternation of escaped keywords, or `None` for an empty table.
fn keyword_pattern(keywords: &[String], open: &str, close: &str) -> Result<Option<Regex>> {
  let keywords: Vec<String> = keywords
    .iter()
    .map(|k| k.trim().to_lowercase())
    .filter(|k| !k.is_empty())
    .map(|k| regex::escape(&k))
    .collect();
  if keywords.is_empty() {
    return Ok(None);
  }
  let pattern = format!("(?i){open}{}{close}", keywords.join("|"));
  Regex::new(&pattern)
    .map(Some)
    .map_err(|e| PharmalitError::Config(format!("Invalid classifier table: {e}")))
}
