//! Sequences the three phases of a run: scrape, enrich batches, mosaic.

use std::ops::Range;
use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{info, info_span, Instrument};

use crate::config::RunConfig;
use crate::enrich::{enrich_batch, XmlApi, DEFAULT_BATCH_SIZE};
use crate::http::{Fetcher, Throttle};
use crate::mosaic::{render_mosaic, write_mosaic, Grid};
use crate::ranks::{scrape_ranks, BggListing, DEFAULT_PAGES};
use crate::table::Table;

/// Upper bound on enrichment batches per run (50 × 100 covers the top 5000).
pub const MAX_API_BATCHES: u32 = 50;

/// Which phases to run and with what bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub scrape: bool,
    /// Listing pages to scrape, end exclusive.
    pub pages: Range<u32>,
    pub api_batches: u32,
    pub batch_size: usize,
    pub visualize: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            scrape: false,
            pages: DEFAULT_PAGES,
            api_batches: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            visualize: false,
        }
    }
}

impl RunPlan {
    pub fn validate(&self) -> Result<()> {
        if self.api_batches > MAX_API_BATCHES {
            bail!(
                "invalid value for api batches {} [0, {}]",
                self.api_batches,
                MAX_API_BATCHES
            );
        }
        if !(1..=DEFAULT_BATCH_SIZE).contains(&self.batch_size) {
            bail!(
                "invalid batch size {} [1, {}]",
                self.batch_size,
                DEFAULT_BATCH_SIZE
            );
        }
        if self.scrape && (self.pages.start == 0 || self.pages.is_empty()) {
            bail!(
                "invalid page range {}..{}: pages start at 1 and the end is exclusive",
                self.pages.start,
                self.pages.end
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scraped_rows: Option<usize>,
    pub batches_requested: u32,
    pub rows_enriched: usize,
    /// Unenriched rows after the enrich phase, when it ran.
    pub remaining: Option<usize>,
    pub mosaic: Option<PathBuf>,
}

fn grid_from(config: &RunConfig) -> Grid {
    Grid {
        rows: config.grid_rows,
        cols: config.grid_cols,
        cell_width: config.thumb_width,
        cell_height: config.thumb_height,
    }
}

fn load_table(existing: Option<Table>, config: &RunConfig) -> Result<Table> {
    match existing {
        Some(table) => Ok(table),
        None => {
            let path = config.table_path();
            if !path.exists() {
                bail!(
                    "no table to work on at {}; run with --scrape first",
                    path.display()
                );
            }
            Table::load(&path)
        }
    }
}

/// Run the phases `plan` asks for, in order. The first failure ends the run;
/// whatever the last completed phase or batch wrote to disk stays usable.
pub async fn run(
    plan: &RunPlan,
    config: &RunConfig,
    fetcher: &dyn Fetcher,
    throttle: Throttle,
) -> Result<RunSummary> {
    plan.validate()?;
    let table_path = config.table_path();
    let mut summary = RunSummary::default();
    let mut table: Option<Table> = None;

    if plan.scrape {
        let source = BggListing::new(fetcher, &config.site_base)?;
        let scraped = scrape_ranks(&source, plan.pages.clone(), throttle, &table_path)
            .instrument(info_span!("scrape", pages = ?plan.pages))
            .await?;
        summary.scraped_rows = Some(scraped.len());
        table = Some(scraped);
    }

    if plan.api_batches > 0 {
        let mut current = load_table(table.take(), config)?;
        let api = XmlApi::new(fetcher, &config.api_base);
        for batch in 1..=plan.api_batches {
            let report = enrich_batch(&mut current, &api, plan.batch_size, &table_path)
                .instrument(info_span!("enrich", batch, of = plan.api_batches))
                .await?;
            if report.requested == 0 {
                info!(batch, "table fully enriched; skipping remaining batches");
                break;
            }
            summary.batches_requested += 1;
            summary.rows_enriched += report.updated;
            throttle.pause().await;
        }
        summary.remaining = Some(current.pending_count());
        table = Some(current);
    }

    if plan.visualize {
        let current = load_table(table.take(), config)?;
        let path = config.mosaic_path();
        let canvas = render_mosaic(&current, &grid_from(config), fetcher, throttle)
            .instrument(info_span!("visualize"))
            .await?;
        write_mosaic(&canvas, &path)?;
        summary.mosaic = Some(path);
    }

    info!(?summary, "run finished");
    Ok(summary)
}
