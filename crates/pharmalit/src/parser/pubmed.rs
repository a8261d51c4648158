//! `<PubmedArticle>` records (MEDLINE citation format).

use super::*;

/// Date elements collected under `PubDate` or `ArticleDate`.
#[derive(Debug, Default)]
struct DateParts {
  /// `Year` text
  year:         String,
  /// `Month` text
  month:        String,
  /// `Day` text
  day:          String,
  /// Free-form `MedlineDate`, e.g. "1998 Dec-1999 Jan"
  medline_date: String,
}

/// One `<Author>` being read.
#[derive(Debug, Default)]
struct AuthorParts {
  /// `LastName`
  last_name:    String,
  /// `ForeName`, falling back to `Initials`
  fore_name:    String,
  /// `Initials`
  initials:     String,
  /// `CollectiveName` for group authors
  collective:   String,
  /// Explicit `Email` element, if any
  email:        String,
  /// Finished affiliation texts
  affiliations: Vec<String>,
  /// The affiliation currently being read
  affiliation:  Option<String>,
}

/// Builds a [`Paper`] from `<PubmedArticle>` events.
#[derive(Debug, Default)]
pub(crate) struct PubmedBuilder {
  /// `MedlineCitation/PMID`
  pmid:                String,
  /// `ArticleId` values with `IdType="pubmed"`
  article_pmid:        String,
  /// `ArticleTitle`, present once the element was seen
  title:               Option<String>,
  /// `JournalIssue/PubDate`
  pub_date:            DateParts,
  /// `ArticleDate` (electronic publication)
  article_date:        DateParts,
  /// Finished authors, in document order
  authors:             Vec<Author>,
  /// The author currently being read
  author:              Option<AuthorParts>,
  /// Record-level `CorrespondingAuthorEmail`
  corresponding_email: String,
}

impl DateParts {
  /// Appends text to the part named by `element`.
  fn push(&mut self, element: &str, text: &str) {
    match element {
      "Year" => self.year.push_str(text),
      "Month" => self.month.push_str(text),
      "Day" => self.day.push_str(text),
      "MedlineDate" => self.medline_date.push_str(text),
      _ => (),
    }
  }

  /// The most precise date the parts describe.
  fn resolve(&self) -> PublicationDate {
    let part: for<'a> fn(&'a str) -> Option<&'a str> = |s| Some(s.trim()).filter(|s| !s.is_empty());
    match PublicationDate::from_parts(part(&self.year), part(&self.month), part(&self.day)) {
      PublicationDate::Unknown => medline_date(&self.medline_date),
      date => date,
    }
  }
}

/// A `MedlineDate` such as "2019 Nov-Dec" is read up to its first month.
fn medline_date(text: &str) -> PublicationDate {
  text.trim().parse().unwrap_or_else(|_| medline_year(text))
}

/// Falls back to the leading four-digit year of a free-form date.
fn medline_year(text: &str) -> PublicationDate {
  let year = text.trim().get(..4).and_then(|year| year.parse::<i32>().ok());
  match year {
    Some(year) => PublicationDate::Year(year),
    None => PublicationDate::Unknown,
  }
}

impl AuthorParts {
  /// Display name, "ForeName LastName" or the collective name.
  fn name(&self) -> String {
    if !self.collective.trim().is_empty() {
      return clean_content(&self.collective);
    }
    let given = if self.fore_name.trim().is_empty() { &self.initials } else { &self.fore_name };
    clean_content(&format!("{given} {}", self.last_name))
  }

  /// Turns the collected parts into an author, or `None` if nameless.
  fn finish(self) -> Option<Author> {
    let name = self.name();
    if name.is_empty() {
      return None;
    }
    let explicit = clean_content(&self.email);
    let email = Some(explicit).filter(|email| !email.is_empty()).or_else(|| {
      self.affiliations.iter().flat_map(|raw| classifier::extract_emails(raw)).next()
    });
    let mut author = Author::new(name);
    author.email = email;
    author.affiliations = self.affiliations.into_iter().map(Affiliation::new).collect();
    Some(author)
  }
}

impl PubmedBuilder {
  /// Whether the path is inside a record author (not an investigator or editor).
  fn in_author(path: &[Element]) -> bool {
    path.iter().rposition(|e| e.is("Author")).is_some_and(|at| {
      at > 0
        && path[at - 1].is("AuthorList")
        && path[at - 1].attr("Type").map_or(true, |kind| kind == "authors")
    })
  }
}

impl RecordBuilder for PubmedBuilder {
  fn open(&mut self, path: &[Element]) {
    if path_ends_with(path, &["AuthorList", "Author"]) && Self::in_author(path) {
      self.author = Some(AuthorParts::default());
    } else if path_ends_with(path, &["AffiliationInfo", "Affiliation"])
      || path_ends_with(path, &["Author", "Affiliation"])
    {
      if let Some(author) = &mut self.author {
        author.affiliation = Some(String::new());
      }
    } else if path_ends_with(path, &["Article", "ArticleTitle"]) && self.title.is_none() {
      self.title = Some(String::new());
    }
  }

  fn text(&mut self, path: &[Element], text: &str) {
    let Some(element) = path.last() else { return };

    if path_ends_with(path, &["MedlineCitation", "PMID"]) {
      self.pmid.push_str(text);
    } else if path_ends_with(path, &["ArticleIdList", "ArticleId"])
      && element.attr("IdType") == Some("pubmed")
      && within(path, "PubmedData")
    {
      self.article_pmid.push_str(text);
    } else if within(path, "ArticleTitle") && within(path, "Article") {
      if let Some(title) = &mut self.title {
        title.push_str(text);
      }
    } else if path.len() >= 2 && path[path.len() - 2].is("PubDate") && within(path, "JournalIssue")
    {
      self.pub_date.push(&element.name, text);
    } else if path.len() >= 2 && path[path.len() - 2].is("ArticleDate") {
      self.article_date.push(&element.name, text);
    } else if element.is("CorrespondingAuthorEmail") {
      self.corresponding_email.push_str(text);
    } else if let Some(author) = &mut self.author {
      if let Some(affiliation) = &mut author.affiliation {
        affiliation.push_str(text);
      } else {
        match element.name.as_str() {
          "LastName" => author.last_name.push_str(text),
          "ForeName" => author.fore_name.push_str(text),
          "Initials" => author.initials.push_str(text),
          "CollectiveName" => author.collective.push_str(text),
          "Email" => author.email.push_str(text),
          _ => (),
        }
      }
    }
  }

  fn close(&mut self, path: &[Element]) {
    let Some(element) = path.last() else { return };

    if element.is("Affiliation") {
      if let Some(author) = &mut self.author {
        if let Some(affiliation) = author.affiliation.take() {
          let affiliation = clean_content(&affiliation);
          if !affiliation.is_empty() {
            author.affiliations.push(affiliation);
          }
        }
      }
    } else if element.is("Author") && Self::in_author(path) {
      if let Some(parts) = self.author.take() {
        match parts.finish() {
          Some(author) => self.authors.push(author),
          None => debug!("skipping author without a name"),
        }
      }
    }
  }

  fn finish(self) -> Result<Paper> {
    let pmid = [self.pmid.trim(), self.article_pmid.trim()]
      .into_iter()
      .find(|id| !id.is_empty())
      .map(str::to_string)
      .ok_or_else(|| PharmalitError::MalformedRecord("PubmedArticle without PMID".to_string()))?;

    let title = self.title.as_deref().map(clean_content).unwrap_or_default();
    if title.is_empty() {
      warn!(pmid = %pmid, "record has no title");
    }

    let publication_date = match self.pub_date.resolve() {
      PublicationDate::Unknown => self.article_date.resolve(),
      date => date,
    };

    let mut authors = self.authors;
    let record_email = Some(clean_content(&self.corresponding_email)).filter(|e| !e.is_empty());
    let corresponding = match &record_email {
      Some(email) => authors.iter().position(|a| a.email.as_deref() == Some(email.as_str())),
      None => authors.iter().position(|a| a.email.is_some()),
    };
    if let Some(index) = corresponding {
      authors[index].is_corresponding = true;
    }
    let corresponding_author_email =
      record_email.or_else(|| corresponding.and_then(|index| authors[index].email.clone()));

    trace!(pmid = %pmid, authors = authors.len(), "parsed PubmedArticle");
    Ok(Paper {
      pmid,
      title_missing: title.is_empty(),
      title,
      publication_date,
      authors,
      corresponding_author_email,
    })
  }
}
