//! The search run behind `get-papers-list`.

use super::*;

/// Exit code of a process stopped by SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Loads the configuration the command line asks for.
pub fn load_config(cli: &Cli) -> Result<PharmalitConfig> {
  let config = match &cli.config {
    Some(path) => PharmalitConfig::from_file(path)?.with_env(),
    None => PharmalitConfig::load_default()?,
  };
  Ok(config.with_api_key(cli.api_key.clone()))
}

/// Runs the query, shows the papers and writes the output file.
///
/// In table mode without an output file, papers are printed batch by batch as they arrive.
/// Every other output needs the complete result set and is produced at the end. The first
/// Ctrl-C stops the search before its next batch and the papers fetched until then are still
/// shown; another Ctrl-C, or one pressed after the search ended, exits at once.
pub async fn run<I: UserInteraction>(interaction: &I, cli: &Cli) -> Result<()> {
  let config = load_config(cli)?;
  let fetcher = Fetcher::from_config(config)?.only_non_academic(!cli.all);

  interaction.reply(ResponseContent::Info(&format!("Searching PubMed for: {}", cli.query)))?;
  let mut search = fetcher.search(&cli.query, cli.result_limit()).await?;
  debug!("{} identifiers to fetch", search.identifier_count());

  let cancel = search.cancel_handle();
  tokio::spawn(async move {
    while tokio::signal::ctrl_c().await.is_ok() {
      if should_exit_on_interrupt(&cancel) {
        std::process::exit(INTERRUPTED_EXIT_CODE);
      }
      eprintln!("{} Stopping after the current batch", style(WARNING_PREFIX).yellow());
    }
  });

  let streaming = cli.file.is_none() && cli.format == OutputFormat::Table;
  let mut papers = Vec::new();
  let outcome = loop {
    match search.next_batch().await {
      Some(Ok(batch)) => {
        if streaming {
          for paper in &batch {
            interaction.reply(ResponseContent::Paper(paper))?;
          }
        }
        papers.extend(batch);
      },
      Some(Err(e)) => break Err(e),
      None => break Ok(()),
    }
  };
  let handle = search.cancel_handle();
  let cancelled = handle.is_cancelled();
  // nothing left to stop gracefully
  handle.cancel();
  outcome?;

  let report = search.report();
  if cancelled {
    interaction.reply(ResponseContent::Warning("Search interrupted; results are incomplete"))?;
  }

  if papers.is_empty() {
    interaction.reply(ResponseContent::Info("No papers found matching the criteria"))?;
  }

  match &cli.file {
    Some(path) => {
      match cli.format {
        OutputFormat::Json => std::fs::write(path, export::to_json(&papers)?)?,
        _ => export::write_csv_file(path, &papers)?,
      }
      interaction.reply(ResponseContent::Success(&format!(
        "{} papers saved to {}",
        papers.len(),
        path.display()
      )))?;
    },
    None if !streaming => interaction.reply(ResponseContent::Papers(&papers))?,
    None => {},
  }

  if report.is_partial() || cli.verbosity() > 0 {
    interaction.reply(ResponseContent::Report(report))?;
  }
  Ok(())
}

/// Handles one Ctrl-C: the first one cancels the search, any later one asks for an exit.
pub fn should_exit_on_interrupt(cancel: &CancelHandle) -> bool {
  if cancel.is_cancelled() {
    return true;
  }
  cancel.cancel();
  false
}
