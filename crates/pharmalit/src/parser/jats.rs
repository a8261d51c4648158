//! `<article>` records (JATS, as served by PMC).
//!
//! JATS declares an affiliation once (`<aff id="aff1">`) and lets any number of contributors
//! point at it (`<xref ref-type="aff" rid="aff1"/>`). References are resolved after the whole
//! record has been read, so declaration order does not matter, and each author receives its
//! own copy of the affiliation text.

use super::*;

/// Date elements of one `<pub-date>`.
#[derive(Debug, Default)]
struct DateParts {
  /// `year`
  year:  String,
  /// `month`
  month: String,
  /// `day`
  day:   String,
}

/// One `<contrib contrib-type="author">` being read.
#[derive(Debug, Default)]
struct ContribParts {
  /// `surname`
  surname:       String,
  /// `given-names`
  given_names:   String,
  /// `collab` for group authors
  collab:        String,
  /// `email` inside the contributor
  email:         String,
  /// `corresp="yes"` or a corresponding-author cross reference
  corresponding: bool,
  /// Affiliation ids referenced through `xref`
  aff_refs:      Vec<String>,
  /// Affiliations written inline inside the contributor
  inline_affs:   Vec<String>,
}

/// An `<aff>` being read.
#[derive(Debug, Default)]
struct AffParts {
  /// `id` attribute, if declared for reference
  id:     Option<String>,
  /// Whether the aff sits inside a contributor
  inline: bool,
  /// Text collected so far, `label` excluded
  text:   String,
}

/// Builds a [`Paper`] from JATS `<article>` events.
#[derive(Debug, Default)]
pub(crate) struct JatsBuilder {
  /// `article-id` values by `pub-id-type`, in document order
  ids:                Vec<(String, String)>,
  /// The id currently being read
  id:                 Option<(String, String)>,
  /// `article-title`, present once the element was seen
  title:              Option<String>,
  /// Every `pub-date` of the article
  dates:              Vec<DateParts>,
  /// Contributors, in document order
  contribs:           Vec<ContribParts>,
  /// The contributor currently being read
  contrib:            Option<ContribParts>,
  /// The affiliation currently being read
  aff:                Option<AffParts>,
  /// Declared affiliations by id
  affs_by_id:         HashMap<String, String>,
  /// Article-level affiliations without id, shared by authors that reference nothing
  shared_affs:        Vec<String>,
  /// `email` inside `author-notes/corresp`
  notes_email:        String,
}

impl DateParts {
  /// The date these parts describe.
  fn resolve(&self) -> PublicationDate {
    let part: for<'a> fn(&'a str) -> Option<&'a str> = |s| Some(s.trim()).filter(|s| !s.is_empty());
    PublicationDate::from_parts(part(&self.year), part(&self.month), part(&self.day))
  }
}

/// Relative precision of a date, used to pick among several `pub-date`s.
fn precision(date: &PublicationDate) -> u8 {
  match date {
    PublicationDate::Day(_) => 3,
    PublicationDate::Month { .. } => 2,
    PublicationDate::Year(_) => 1,
    PublicationDate::Unknown => 0,
  }
}

impl ContribParts {
  /// Display name, "given-names surname" or the collaboration name.
  fn name(&self) -> String {
    if !self.collab.trim().is_empty() {
      return clean_content(&self.collab);
    }
    clean_content(&format!("{} {}", self.given_names, self.surname))
  }
}

impl JatsBuilder {
  /// Whether the path is inside the main article's metadata.
  fn in_meta(path: &[Element]) -> bool { within(path, "article-meta") }
}

impl RecordBuilder for JatsBuilder {
  fn open(&mut self, path: &[Element]) {
    let Some(element) = path.last() else { return };
    if !Self::in_meta(path) {
      return;
    }

    match element.name.as_str() {
      "article-id" => {
        let kind = element.attr("pub-id-type").unwrap_or_default().to_string();
        self.id = Some((kind, String::new()));
      },
      "article-title" if within(path, "title-group") && self.title.is_none() =>
        self.title = Some(String::new()),
      "pub-date" => self.dates.push(DateParts::default()),
      "contrib" if element.attr("contrib-type").map_or(true, |kind| kind == "author") => {
        let corresponding = element.attr("corresp") == Some("yes");
        self.contrib = Some(ContribParts { corresponding, ..Default::default() });
      },
      "aff" =>
        self.aff = Some(AffParts {
          id:     element.attr("id").map(str::to_string),
          inline: within(path, "contrib"),
          text:   String::new(),
        }),
      "xref" =>
        if let Some(contrib) = &mut self.contrib {
          match element.attr("ref-type") {
            Some("aff") => contrib
              .aff_refs
              .extend(element.attr("rid").unwrap_or_default().split_whitespace().map(str::to_string)),
            Some("corresp") => contrib.corresponding = true,
            _ => (),
          }
        },
      _ => (),
    }
  }

  fn text(&mut self, path: &[Element], text: &str) {
    let Some(element) = path.last() else { return };
    if !Self::in_meta(path) {
      return;
    }

    if let Some(aff) = &mut self.aff {
      if !within(path, "label") {
        aff.text.push_str(text);
      }
    } else if let Some((_, value)) = &mut self.id {
      value.push_str(text);
    } else if within(path, "article-title") && within(path, "title-group") {
      if let Some(title) = &mut self.title {
        title.push_str(text);
      }
    } else if path.len() >= 2 && path[path.len() - 2].is("pub-date") {
      if let Some(date) = self.dates.last_mut() {
        match element.name.as_str() {
          "year" => date.year.push_str(text),
          "month" => date.month.push_str(text),
          "day" => date.day.push_str(text),
          _ => (),
        }
      }
    } else if let Some(contrib) = &mut self.contrib {
      match element.name.as_str() {
        "surname" => contrib.surname.push_str(text),
        "given-names" => contrib.given_names.push_str(text),
        "collab" => contrib.collab.push_str(text),
        "email" => contrib.email.push_str(text),
        _ => (),
      }
    } else if element.is("email") && within(path, "corresp") && within(path, "author-notes") {
      self.notes_email.push_str(text);
    }
  }

  fn close(&mut self, path: &[Element]) {
    let Some(element) = path.last() else { return };
    if !Self::in_meta(path) {
      return;
    }

    match element.name.as_str() {
      "article-id" =>
        if let Some((kind, value)) = self.id.take() {
          self.ids.push((kind, value.trim().to_string()));
        },
      "aff" =>
        if let Some(aff) = self.aff.take() {
          let text = clean_content(&aff.text);
          if text.is_empty() {
            return;
          }
          if let Some(id) = aff.id {
            if aff.inline {
              if let Some(contrib) = &mut self.contrib {
                contrib.aff_refs.push(id.clone());
              }
            }
            self.affs_by_id.insert(id, text);
          } else if aff.inline {
            if let Some(contrib) = &mut self.contrib {
              contrib.inline_affs.push(text);
            }
          } else {
            self.shared_affs.push(text);
          }
        },
      // Separates adjacent elements such as `<institution>` and `<country>`.
      _ if self.aff.is_some() =>
        if let Some(aff) = &mut self.aff {
          aff.text.push(' ');
        },
      "contrib" =>
        if let Some(contrib) = self.contrib.take() {
          self.contribs.push(contrib);
        },
      _ => (),
    }
  }

  fn finish(self) -> Result<Paper> {
    let id_of = |kind: &str| {
      self.ids.iter().find(|(k, v)| k == kind && !v.is_empty()).map(|(_, v)| v.clone())
    };
    let pmid = id_of("pmid")
      .or_else(|| id_of("pmc"))
      .or_else(|| id_of("pmcid"))
      .ok_or_else(|| PharmalitError::MalformedRecord("article without pmid or pmc id".to_string()))?;

    let title = self.title.as_deref().map(clean_content).unwrap_or_default();
    if title.is_empty() {
      warn!(pmid = %pmid, "record has no title");
    }

    let publication_date = self
      .dates
      .iter()
      .map(DateParts::resolve)
      .fold(PublicationDate::Unknown, |best, date| {
        if precision(&date) > precision(&best) {
          date
        } else {
          best
        }
      });

    let mut authors = Vec::with_capacity(self.contribs.len());
    for contrib in self.contribs {
      let name = contrib.name();
      if name.is_empty() {
        debug!(pmid = %pmid, "skipping contributor without a name");
        continue;
      }
      let mut affiliations = contrib.inline_affs.clone();
      for rid in &contrib.aff_refs {
        match self.affs_by_id.get(rid) {
          Some(text) if !affiliations.contains(text) => affiliations.push(text.clone()),
          Some(_) => (),
          None => debug!(pmid = %pmid, rid = %rid, "unresolved affiliation reference"),
        }
      }
      if affiliations.is_empty() {
        affiliations = self.shared_affs.clone();
      }

      let email = Some(clean_content(&contrib.email)).filter(|email| !email.is_empty());
      let mut author = Author::new(name);
      author.affiliations = affiliations.into_iter().map(Affiliation::new).collect();
      author.email = email;
      author.is_corresponding = contrib.corresponding;
      authors.push(author);
    }

    let notes_email = Some(clean_content(&self.notes_email)).filter(|email| !email.is_empty());
    let corresponding_author_email = authors
      .iter()
      .find(|author| author.is_corresponding)
      .and_then(|author| author.email.clone())
      .or(notes_email);

    trace!(pmid = %pmid, authors = authors.len(), "parsed JATS article");
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

#[cfg(test)]
mod tests {
  use super::*;

  const SHARED_AFFILIATION: &str = r#"<article article-type="research-article" xmlns:xlink="http://www.w3.org/1999/xlink">
  <front>
    <article-meta>
      <article-id pub-id-type="pmc">9876543</article-id>
      <article-id pub-id-type="pmid">35550001</article-id>
      <title-group><article-title>Biomarker-driven <italic>dose</italic> selection</article-title></title-group>
      <contrib-group>
        <contrib contrib-type="author">
          <name><surname>Garcia</surname><given-names>Maria</given-names></name>
          <xref ref-type="aff" rid="aff1">1</xref>
        </contrib>
        <contrib contrib-type="author" corresp="yes">
          <name><surname>Chen</surname><given-names>Wei</given-names></name>
          <xref ref-type="aff" rid="aff1">1</xref>
          <xref ref-type="aff" rid="aff2">2</xref>
          <email>wei.chen@gene.com</email>
        </contrib>
        <contrib contrib-type="editor">
          <name><surname>Editor</surname><given-names>An</given-names></name>
        </contrib>
      </contrib-group>
      <aff id="aff1"><label>1</label><institution>Genentech, Inc.</institution>, <addr-line>South San Francisco</addr-line>, <country>USA</country></aff>
      <aff id="aff2"><label>2</label>Stanford University School of Medicine, Stanford, CA</aff>
      <pub-date pub-type="collection"><year>2022</year></pub-date>
      <pub-date pub-type="epub"><day>09</day><month>05</month><year>2022</year></pub-date>
    </article-meta>
  </front>
  <body><p>Text with <name><surname>Ignored</surname></name></p></body>
  <back><ref-list><ref><element-citation><person-group><name><surname>Cited</surname></name></person-group></element-citation></ref></ref-list></back>
</article>"#;

  #[traced_test]
  #[test]
  fn test_parse_jats_article() {
    let paper = parse_record_str(SHARED_AFFILIATION).unwrap();
    assert_eq!(paper.pmid, "35550001");
    assert_eq!(paper.title, "Biomarker-driven dose selection");
    assert_eq!(paper.publication_date.to_string(), "2022-05-09");

    let names: Vec<_> = paper.authors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Maria Garcia", "Wei Chen"]);
  }

  #[traced_test]
  #[test]
  fn test_shared_affiliation_is_copied_per_author() {
    let paper = parse_record_str(SHARED_AFFILIATION).unwrap();
    let genentech = "Genentech, Inc., South San Francisco, USA";
    assert_eq!(paper.authors[0].affiliations, vec![Affiliation::new(genentech)]);
    assert_eq!(paper.authors[1].affiliations.len(), 2);
    assert_eq!(paper.authors[1].affiliations[0].raw, genentech);
    assert_eq!(
      paper.authors[1].affiliations[1].raw,
      "Stanford University School of Medicine, Stanford, CA"
    );

    // Copies are independent: classifying one author's affiliation leaves the other alone.
    let mut paper = paper;
    paper.authors[0].affiliations[0].raw.push_str(" (edited)");
    assert_eq!(paper.authors[1].affiliations[0].raw, genentech);
  }

  #[traced_test]
  #[test]
  fn test_jats_corresponding_author() {
    let paper = parse_record_str(SHARED_AFFILIATION).unwrap();
    assert!(paper.authors[1].is_corresponding);
    assert_eq!(paper.corresponding_author_email.as_deref(), Some("wei.chen@gene.com"));
  }

  #[traced_test]
  #[test]
  fn test_classified_jats_article() {
    let paper = parse_record_str(SHARED_AFFILIATION).unwrap().classify(&Classifier::default());
    assert!(paper.has_pharma_authors);
    assert_eq!(paper.non_academic_authors, vec!["Maria Garcia", "Wei Chen"]);
    assert_eq!(paper.company_affiliations.len(), 1);
    assert!(paper.company_affiliations[0].starts_with("Genentech"));
  }

  #[traced_test]
  #[test]
  fn test_references_resolve_regardless_of_order() {
    let xml = r#"<article><front><article-meta>
      <article-id pub-id-type="pmid">1</article-id>
      <aff id="a1">Merck &amp; Co., Rahway, NJ</aff>
      <contrib-group><contrib contrib-type="author">
        <name><surname>Park</surname><given-names>Ji</given-names></name>
        <xref ref-type="aff" rid="a1"/><xref ref-type="aff" rid="missing"/>
      </contrib></contrib-group>
    </article-meta></front></article>"#;
    let paper = parse_record_str(xml).unwrap();
    assert_eq!(paper.authors[0].affiliations[0].raw, "Merck & Co., Rahway, NJ");
    assert_eq!(paper.authors[0].affiliations.len(), 1);
  }

  #[traced_test]
  #[test]
  fn test_unreferenced_affiliation_applies_to_all_authors() {
    let xml = r#"<article><front><article-meta>
      <article-id pub-id-type="pmid">2</article-id>
      <title-group><article-title>T</article-title></title-group>
      <contrib-group>
        <contrib contrib-type="author"><name><surname>A</surname><given-names>B</given-names></name></contrib>
        <contrib contrib-type="author"><name><surname>C</surname><given-names>D</given-names></name></contrib>
      </contrib-group>
      <aff>Department of Medicine, University of Oxford, Oxford, UK</aff>
      <author-notes><corresp>Correspondence: <email>office@ox.ac.uk</email></corresp></author-notes>
    </article-meta></front></article>"#;
    let paper = parse_record_str(xml).unwrap();
    assert!(paper.authors.iter().all(|a| a.affiliations.len() == 1));
    assert_eq!(paper.corresponding_author_email.as_deref(), Some("office@ox.ac.uk"));
  }

  #[traced_test]
  #[test]
  fn test_inline_affiliation() {
    let xml = r#"<article><front><article-meta>
      <article-id pub-id-type="pmc">77</article-id>
      <contrib-group><contrib contrib-type="author">
        <name><surname>Ito</surname><given-names>Ken</given-names></name>
        <aff>Takeda Pharmaceutical Company, Osaka, Japan</aff>
      </contrib></contrib-group>
    </article-meta></front></article>"#;
    let paper = parse_record_str(xml).unwrap();
    assert_eq!(paper.pmid, "77");
    assert!(paper.title_missing);
    assert_eq!(paper.authors[0].affiliations[0].raw, "Takeda Pharmaceutical Company, Osaka, Japan");
    assert_eq!(paper.publication_date, PublicationDate::Unknown);
  }

  #[traced_test]
  #[test]
  fn test_article_without_ids_is_malformed() {
    let xml = "<article><front><article-meta><article-id pub-id-type=\"doi\">10.1/x</article-id>\
               </article-meta></front></article>";
    assert!(matches!(parse_record_str(xml), Err(PharmalitError::MalformedRecord(_))));
  }
}
