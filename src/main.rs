use std::path::PathBuf;

use anyhow::Result;
use bgg_pull::config::RunConfig;
use bgg_pull::driver::{self, RunPlan, MAX_API_BATCHES};
use bgg_pull::http::{HttpFetcher, Throttle};
use bgg_pull::logging::init_tracing;
use bgg_pull::util::env as env_util;
use clap::Parser;
use tracing::{error, info};

/// Collects the top ranked games from BoardGameGeek into a CSV table.
///
/// Scrape once (about ten minutes for 50 pages), then fill in details with
/// repeated API batches; each batch rewrites the table, so runs can be resumed.
#[derive(Parser, Debug)]
#[command(name = "bgg-pull", version, about)]
struct Cli {
    /// Scrape the ranked listing pages and rebuild the table from scratch
    #[arg(short = 's', long)]
    scrape: bool,
    /// How many groups of up to 100 games to fetch from the XML API
    #[arg(
        short = 'a',
        long = "api",
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(0..=MAX_API_BATCHES as i64)
    )]
    api_batches: u32,
    /// Render the thumbnail mosaic from the table
    #[arg(short = 'v', long)]
    visualize: bool,
    /// First listing page to scrape
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    page_start: u32,
    /// Listing page to stop at (exclusive)
    #[arg(long, default_value_t = 51)]
    page_end: u32,
    /// Ids per API request
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..=100))]
    batch_size: u32,
    /// Table file; relative paths are taken from BGG_OUTPUT_DIR
    #[arg(long)]
    table: Option<PathBuf>,
}

impl Cli {
    fn plan(&self) -> RunPlan {
        RunPlan {
            scrape: self.scrape,
            pages: self.page_start..self.page_end,
            api_batches: self.api_batches,
            batch_size: self.batch_size as usize,
            visualize: self.visualize,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();

    let mut config = RunConfig::from_env();
    if let Some(table) = &cli.table {
        config.table_file = table.to_string_lossy().into_owned();
    }
    let log_file = init_tracing("info", config.log_dir.as_deref())?;
    if let Some(path) = log_file {
        info!(path = %path.display(), "logging to file");
    }

    let plan = cli.plan();
    plan.validate()?;
    if !plan.scrape && plan.api_batches == 0 && !plan.visualize {
        info!("nothing to do; pass --scrape, --api <n> or --visualize");
        return Ok(());
    }
    info!(?plan, table = %config.table_path().display(), "starting run");

    let fetcher = HttpFetcher::new(config.http_timeout, &config.user_agent)?;
    if let Err(err) = driver::run(&plan, &config, &fetcher, Throttle::polite()).await {
        error!(error = ?err, "run aborted");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn api_batches_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from(["bgg-pull", "--api", "51"]).is_err());
        assert!(Cli::try_parse_from(["bgg-pull", "-a", "-1"]).is_err());
        let cli = Cli::try_parse_from(["bgg-pull", "-s", "-a", "50", "-v"]).unwrap();
        assert_eq!(
            cli.plan(),
            RunPlan {
                scrape: true,
                api_batches: 50,
                visualize: true,
                ..RunPlan::default()
            }
        );
    }

    #[test]
    fn page_range_and_batch_size_flags() {
        let cli = Cli::try_parse_from([
            "bgg-pull",
            "--scrape",
            "--page-start",
            "3",
            "--page-end",
            "4",
            "--batch-size",
            "20",
        ])
        .unwrap();
        let plan = cli.plan();
        assert_eq!(plan.pages, 3..4);
        assert_eq!(plan.batch_size, 20);
        assert!(Cli::try_parse_from(["bgg-pull", "--batch-size", "0"]).is_err());
    }
}
