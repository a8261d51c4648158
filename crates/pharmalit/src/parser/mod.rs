//! Record parsing: from E-utilities XML to [`Paper`]s.
//!
//! An efetch response is a document holding many articles. [`split_records`] cuts it into one
//! [`RawRecord`] per article, and [`parse_record`] turns a single raw record into a [`Paper`].
//! Keeping the two steps apart lets the orchestrator skip a malformed article without losing
//! the rest of its batch.
//!
//! Two record dialects are understood:
//!
//! - [`Dialect::Pubmed`]: `<PubmedArticle>` MEDLINE citations (`db=pubmed`)
//! - [`Dialect::Jats`]: `<article>` JATS documents (`db=pmc`), where an affiliation is declared
//!   once with `<aff id="...">` and referenced from any number of authors
//!
//! Both dialects are read with the same path-tracking walk over `quick-xml` events; each
//! dialect only decides what to do with the elements it recognizes.
//!
//! # Examples
//!
//! ```
//! use pharmalit::parser::{parse_record, split_records};
//!
//! let xml = r#"<PubmedArticleSet>
//!   <PubmedArticle>
//!     <MedlineCitation>
//!       <PMID>12345678</PMID>
//!       <Article><ArticleTitle>KRAS G12D in pancreatic cancer</ArticleTitle></Article>
//!     </MedlineCitation>
//!   </PubmedArticle>
//! </PubmedArticleSet>"#;
//!
//! let records = split_records(xml)?;
//! let paper = parse_record(&records[0])?;
//! assert_eq!(paper.pmid, "12345678");
//! assert_eq!(paper.title, "KRAS G12D in pancreatic cancer");
//! # Ok::<(), pharmalit::error::PharmalitError>(())
//! ```

use std::borrow::Cow;

use quick_xml::{
  events::{BytesStart, Event},
  Reader,
};

use super::*;

mod jats;
mod pubmed;

lazy_static! {
  /// Markup left in text content (escaped tags that were unescaped by the reader).
  static ref MARKUP: Regex = Regex::new(r"</?[a-zA-Z][^>]*>").unwrap();
  /// Whitespace before a separator, left behind when adjacent elements are joined.
  static ref SPACE_BEFORE_SEPARATOR: Regex = Regex::new(r"\s+([,;.:])").unwrap();
}

/// The XML vocabulary a raw record is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
  /// PubMed/MEDLINE `<PubmedArticle>`
  Pubmed,
  /// PMC JATS `<article>`
  Jats,
}

/// One article's XML, cut out of a larger efetch document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  /// Vocabulary of the record
  pub dialect: Dialect,
  /// The record element and everything inside it
  pub xml:     String,
}

/// An open element on the path from the record root to the current event.
#[derive(Debug, Clone)]
pub(crate) struct Element {
  /// Local element name (namespace prefix dropped)
  pub(crate) name:       String,
  /// Attributes by local name, unescaped
  pub(crate) attributes: Vec<(String, String)>,
}

/// Receives the walk over one record and assembles a [`Paper`].
pub(crate) trait RecordBuilder: Default {
  /// An element opened; it is the last entry of `path`.
  fn open(&mut self, path: &[Element]);
  /// Text (or CDATA) inside the last element of `path`.
  fn text(&mut self, path: &[Element], text: &str);
  /// The last element of `path` is about to close.
  fn close(&mut self, path: &[Element]);
  /// Produces the paper once the whole record has been walked.
  fn finish(self) -> Result<Paper>;
}

impl Dialect {
  /// Record root element name for this dialect.
  pub fn root_element(&self) -> &'static str {
    match self {
      Dialect::Pubmed => "PubmedArticle",
      Dialect::Jats => "article",
    }
  }

  /// The dialect whose record root is `name`.
  fn from_root(name: &[u8]) -> Option<Self> {
    match name {
      b"PubmedArticle" => Some(Dialect::Pubmed),
      b"article" => Some(Dialect::Jats),
      _ => None,
    }
  }
}

impl RawRecord {
  /// Wraps the XML of a single record, detecting its dialect from the root element.
  ///
  /// # Errors
  ///
  /// Returns [`PharmalitError::MalformedRecord`] if the first element is not a known record
  /// root.
  pub fn from_xml(xml: impl Into<String>) -> Result<Self> {
    let xml = xml.into();
    let mut reader = Reader::from_str(&xml);
    let dialect = loop {
      match reader.read_event() {
        Ok(Event::Start(e)) | Ok(Event::Empty(e)) => break Dialect::from_root(e.local_name().as_ref()),
        Ok(Event::Eof) => break None,
        Ok(_) => continue,
        Err(e) => return Err(PharmalitError::MalformedRecord(e.to_string())),
      }
    };
    match dialect {
      Some(dialect) => Ok(Self { dialect, xml }),
      None => Err(PharmalitError::MalformedRecord("Unknown record root element".to_string())),
    }
  }
}

impl Element {
  /// Captures name and attributes of a start tag.
  fn from_start(start: &BytesStart) -> Self {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let attributes = start
      .attributes()
      .flatten()
      .filter_map(|attr| {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attr.unescape_value().ok().map(|value| (key, value.into_owned()))
      })
      .collect();
    Self { name, attributes }
  }

  /// Value of the attribute with the given local name.
  pub(crate) fn attr(&self, key: &str) -> Option<&str> {
    self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  /// Whether the element has the given name.
  pub(crate) fn is(&self, name: &str) -> bool { self.name == name }
}

/// Splits an efetch document into one raw record per article.
///
/// Records are cut out verbatim, so parsing a record later sees exactly the bytes the
/// service returned. If the document turns out to be truncated or broken, the records read
/// before the error are still returned; an error is only reported when nothing usable was
/// found.
pub fn split_records(document: &str) -> Result<Vec<RawRecord>> {
  let mut reader = Reader::from_str(document);
  let mut records = Vec::new();
  // (dialect, start offset, nesting depth of the root name)
  let mut open: Option<(Dialect, usize, usize)> = None;

  loop {
    let before = reader.buffer_position() as usize;
    let event = match reader.read_event() {
      Ok(event) => event,
      Err(e) => {
        if records.is_empty() {
          return Err(PharmalitError::Xml(e));
        }
        warn!("efetch document broken after {} records: {}", records.len(), e);
        break;
      },
    };
    let after = reader.buffer_position() as usize;

    match event {
      Event::Start(e) => match &mut open {
        Some((dialect, _, depth)) =>
          if e.local_name().as_ref() == dialect.root_element().as_bytes() {
            *depth += 1;
          },
        None =>
          if let Some(dialect) = Dialect::from_root(e.local_name().as_ref()) {
            open = Some((dialect, before, 1));
          },
      },
      Event::Empty(e) =>
        if open.is_none() {
          if let Some(dialect) = Dialect::from_root(e.local_name().as_ref()) {
            records.push(RawRecord { dialect, xml: document[before..after].trim().to_string() });
          }
        },
      Event::End(e) =>
        if let Some((dialect, start, depth)) = &mut open {
          if e.local_name().as_ref() == dialect.root_element().as_bytes() {
            *depth -= 1;
            if *depth == 0 {
              let xml = document[*start..after].trim().to_string();
              records.push(RawRecord { dialect: *dialect, xml });
              open = None;
            }
          }
        },
      Event::Eof => break,
      _ => (),
    }
  }

  trace!("split efetch document into {} records", records.len());
  Ok(records)
}

/// Parses one raw record into a [`Paper`].
///
/// Parsing is pure: the same record always yields an equal paper.
///
/// # Errors
///
/// Returns [`PharmalitError::MalformedRecord`] when the record has no identifier or is not
/// well-formed XML. A missing title is not an error: the paper gets an empty title and
/// `title_missing` is set.
pub fn parse_record(record: &RawRecord) -> Result<Paper> {
  match record.dialect {
    Dialect::Pubmed => build::<pubmed::PubmedBuilder>(&record.xml),
    Dialect::Jats => build::<jats::JatsBuilder>(&record.xml),
  }
}

/// Convenience wrapper: detects the dialect of `xml` and parses it.
pub fn parse_record_str(xml: &str) -> Result<Paper> { parse_record(&RawRecord::from_xml(xml)?) }

/// Walks a record with the given builder.
fn build<B: RecordBuilder>(xml: &str) -> Result<Paper> {
  let mut builder = B::default();
  walk(xml, &mut builder).map_err(|e| PharmalitError::MalformedRecord(e.to_string()))?;
  builder.finish()
}

/// Drives a [`RecordBuilder`] over the events of `xml`, keeping the element path.
fn walk<B: RecordBuilder>(xml: &str, builder: &mut B) -> Result<()> {
  let mut reader = Reader::from_str(xml);
  let mut path: Vec<Element> = Vec::new();

  loop {
    match reader.read_event()? {
      Event::Start(e) => {
        path.push(Element::from_start(&e));
        builder.open(&path);
      },
      Event::Empty(e) => {
        path.push(Element::from_start(&e));
        builder.open(&path);
        builder.close(&path);
        path.pop();
      },
      Event::Text(e) => {
        let text = e
          .unescape()
          .map(Cow::into_owned)
          .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
        builder.text(&path, &text);
      },
      Event::CData(e) => builder.text(&path, &String::from_utf8_lossy(&e)),
      Event::End(_) => {
        builder.close(&path);
        path.pop();
      },
      Event::Eof => break,
      _ => (),
    }
  }
  Ok(())
}

/// Whether the path ends with the given element names.
pub(crate) fn path_ends_with(path: &[Element], names: &[&str]) -> bool {
  path.len() >= names.len()
    && path[path.len() - names.len()..].iter().zip(names).all(|(element, name)| element.is(name))
}

/// Whether any element on the path has the given name.
pub(crate) fn within(path: &[Element], name: &str) -> bool {
  path.iter().any(|element| element.is(name))
}

/// Removes stray markup and normalizes whitespace.
pub(crate) fn clean_content(s: &str) -> String {
  let cleaned = MARKUP.replace_all(s, " ");
  let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
  SPACE_BEFORE_SEPARATOR.replace_all(&cleaned, "$1").into_owned()
}
