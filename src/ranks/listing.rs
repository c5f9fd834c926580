//! Adapter for BoardGameGeek's ranked search pages. The markup is not a
//! stable contract; everything that knows about it lives here.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use super::{RankSource, RankedEntry};
use crate::http::Fetcher;

/// Result blocks per listing page (`results_objectname1..=100`).
pub const ENTRIES_PER_PAGE: usize = 100;

/// Index of the id in `https://host/boardgame/<id>/<slug>` split on `/`.
const ID_SEGMENT: usize = 4;

pub fn listing_url(site_base: &str, page: u32) -> String {
    format!(
        "{}/search/boardgame/page/{}?sort=rank&advsearch=1&sortdir=asc",
        site_base.trim_end_matches('/'),
        page
    )
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector `{css}`: {e}"))
}

/// Game id from a detail URL, e.g. `174430` from
/// `https://boardgamegeek.com/boardgame/174430/gloomhaven`.
pub fn game_id_from_url(url: &str) -> Option<&str> {
    url.split('/')
        .nth(ID_SEGMENT)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_rank(cell: ElementRef<'_>) -> Result<u32> {
    let text: String = cell.text().collect();
    let text = text.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    text.parse::<u32>()
        .with_context(|| format!("rank cell {text:?} is not a number"))
}

/// The `td.collection_rank` of the result row holding `anchor`.
fn rank_cell_of<'a>(anchor: ElementRef<'a>, rank_sel: &Selector) -> Option<ElementRef<'a>> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
        .and_then(|row| row.select(rank_sel).next())
}

/// Extract `(rank, id, detail url)` triples from one listing page.
///
/// Each result block is paired with the rank cell of its own table row. A
/// game whose row has no rank cell is skipped; the rest keep their ranks.
pub fn parse_listing(html: &str, site_base: &Url) -> Result<Vec<RankedEntry>> {
    let doc = Html::parse_document(html);
    let rank_sel = selector("td.collection_rank")?;

    let mut entries = Vec::new();
    for i in 1..=ENTRIES_PER_PAGE {
        let sel = selector(&format!("div#results_objectname{i} > a"))?;
        let Some(anchor) = doc.select(&sel).next() else {
            continue;
        };
        let href = anchor
            .value()
            .attr("href")
            .ok_or_else(|| anyhow!("results_objectname{i}: anchor without href"))?;
        let detail_url = site_base
            .join(href)
            .with_context(|| format!("results_objectname{i}: bad href {href:?}"))?
            .to_string();
        let Some(cell) = rank_cell_of(anchor, &rank_sel) else {
            warn!(block = i, url = %detail_url, "unranked game on listing page; skipped");
            continue;
        };
        let rank = parse_rank(cell).with_context(|| format!("results_objectname{i}"))?;
        let game_id = game_id_from_url(&detail_url)
            .ok_or_else(|| anyhow!("no game id in {detail_url}"))?
            .to_string();
        entries.push(RankedEntry {
            rank,
            game_id,
            detail_url,
        });
    }
    Ok(entries)
}

/// Ranked listing pages fetched over HTTP.
pub struct BggListing<'a> {
    fetcher: &'a dyn Fetcher,
    site_base: Url,
}

impl<'a> BggListing<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, site_base: &str) -> Result<Self> {
        let site_base =
            Url::parse(site_base).with_context(|| format!("bad site base {site_base:?}"))?;
        Ok(Self { fetcher, site_base })
    }
}

#[async_trait]
impl RankSource for BggListing<'_> {
    async fn fetch_page(&self, page: u32) -> Result<Vec<RankedEntry>> {
        let url = listing_url(self.site_base.as_str(), page);
        let resp = self.fetcher.get(&url).await?.error_for_status(&url)?;
        parse_listing(&resp.text(), &self.site_base).with_context(|| format!("parse {url}"))
    }
}
