pub mod listing;

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::http::Throttle;
use crate::table::{GameRow, Table};

pub use listing::BggListing;

/// Pages `1..51` cover the top 5000 games.
pub const DEFAULT_PAGES: Range<u32> = 1..51;

/// One game as it appears on a ranked listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub rank: u32,
    pub game_id: String,
    pub detail_url: String,
}

/// Source of ranked listing pages.
#[async_trait]
pub trait RankSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RankedEntry>>;
}

/// Walk `pages` in order, build a fresh table with every enrichment cell
/// unfetched, and overwrite `table_path` with it.
///
/// Ranks are taken verbatim from the listing. An entry repeating a rank or id
/// seen on an earlier page is skipped. Any page failure aborts without
/// writing.
pub async fn scrape_ranks(
    source: &dyn RankSource,
    pages: Range<u32>,
    throttle: Throttle,
    table_path: &Path,
) -> Result<Table> {
    let mut table = Table::new();
    for page in pages {
        info!(page, "scraping ranked listing page");
        let entries = source
            .fetch_page(page)
            .await
            .with_context(|| format!("ranked listing page {page}"))?;
        let found = entries.len();
        for entry in entries {
            if table.contains_rank(entry.rank) || table.contains_id(&entry.game_id) {
                warn!(
                    page,
                    rank = entry.rank,
                    game_id = %entry.game_id,
                    "rank or game already listed; skipping repeat"
                );
                continue;
            }
            table.push(GameRow::new(entry.rank, entry.game_id, entry.detail_url))?;
        }
        info!(page, found, total = table.len(), "page scraped");
        throttle.pause().await;
    }

    table.save(table_path)?;
    info!(rows = table.len(), path = %table_path.display(), "ranked table written");
    Ok(table)
}
