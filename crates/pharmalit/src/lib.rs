//! PubMed paper retrieval with pharmaceutical/biotech affiliation detection.
//!
//! `pharmalit` searches the NCBI E-utilities API, parses the returned records into a
//! normalized paper model, and flags the authors whose affiliations look like industry
//! (pharmaceutical, biotech, consulting) rather than academia. It provides:
//!
//! - A deterministic, table-driven affiliation classifier
//! - A record parser for PubMed (MEDLINE) and PMC (JATS) article XML
//! - A rate-limited, retrying query orchestrator yielding classified papers in relevance order
//! - CSV, console and JSON-ready export rows
//!
//! # Getting Started
//!
//! ```no_run
//! use futures::StreamExt;
//! use pharmalit::{fetcher::Fetcher, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let fetcher = Fetcher::from_config(PharmalitConfig::load_default()?)?;
//!
//!   // Stream classified papers batch by batch
//!   let search = fetcher.search("clinical trial", 20).await?;
//!   let mut papers = Box::pin(search.into_stream());
//!   while let Some(paper) = papers.next().await {
//!     let paper = paper?;
//!     if paper.has_pharma_authors {
//!       println!("{}: {:?}", paper.paper.title, paper.company_affiliations);
//!     }
//!   }
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`classifier`]: Academic vs. industry affiliation heuristics
//! - [`parser`]: Raw record splitting and parsing into [`paper::Paper`]
//! - [`paper`]: Paper, author, affiliation and date types
//! - [`client`]: The remote literature API seam and its E-utilities implementation
//! - [`throttle`]: Process-wide request pacing and retry policy
//! - [`fetcher`]: The query orchestrator
//! - [`export`]: CSV and console output
//! - [`config`]: TOML configuration
//! - [`prelude`]: Common traits and types for ergonomic imports

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::HashMap,
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
  sync::Arc,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
#[cfg(test)] use tracing_test::traced_test;

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod paper;
pub mod parser;
pub mod throttle;

use crate::{
  classifier::{Classification, Classifier, ClassifierTables, Confidence},
  client::LiteratureApi,
  config::*,
  error::*,
  paper::{Affiliation, Author, ClassifiedPaper, Paper, PublicationDate},
  throttle::{RetryPolicy, Throttle},
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use pharmalit::prelude::*;
///
/// fn example() -> Result<(), PharmalitError> {
///   let classifier = Classifier::default();
///   let classification = classifier.classify("Pfizer Inc., New York, NY");
///   assert!(!classification.is_academic);
///   Ok(())
/// }
/// ```
pub mod prelude {
  pub use crate::{
    classifier::{Classification, Classifier},
    client::LiteratureApi,
    config::PharmalitConfig,
    error::PharmalitError,
    paper::{ClassifiedPaper, Paper},
  };
}
