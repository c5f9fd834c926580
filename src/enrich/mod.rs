//! Fill in unenriched rows from the BGG XML API, one batch of ids per request.

pub mod xml;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use tracing::{error, info, warn};

use crate::http::Fetcher;
use crate::schema::{Arity, FIELDS, MULTI_SEPARATOR};
use crate::table::{Cell, Table};
use xml::Element;

/// Most ids the API is asked for in one request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Every enrichment cell for one game, in [`FIELDS`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDetails {
    pub game_id: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Ids sent to the API; zero means nothing was pending and no request was made.
    pub requested: usize,
    /// Game elements in the response.
    pub returned: usize,
    pub updated: usize,
    /// Unenriched rows left after this batch.
    pub remaining: usize,
}

/// Client for the `boardgame` endpoint of the XML API.
pub struct XmlApi<'a> {
    fetcher: &'a dyn Fetcher,
    api_base: String,
}

impl<'a> XmlApi<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, api_base: &str) -> Self {
        Self {
            fetcher,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn batch_url(&self, ids: &[String]) -> String {
        format!(
            "{}/boardgame/{}?stats=1&marketplace=1",
            self.api_base,
            ids.iter().join(",")
        )
    }

    /// Request `ids` and parse the whole response. Nothing is returned unless
    /// the status is 2xx and the document parses completely.
    pub async fn fetch(&self, ids: &[String]) -> Result<Vec<GameDetails>> {
        let url = self.batch_url(ids);
        info!(%url, ids = ids.len(), "requesting game details");
        let resp = self.fetcher.get(&url).await?;
        if !resp.status.is_success() {
            error!(status = %resp.status, %url, "XML API refused batch");
        }
        let resp = resp.error_for_status(&url)?;
        let root = xml::parse_document(&resp.body).with_context(|| format!("parse {url}"))?;
        extract_games(&root)
    }
}

/// One [`GameDetails`] per child of the response root.
pub fn extract_games(root: &Element) -> Result<Vec<GameDetails>> {
    root.children
        .iter()
        .map(|game| {
            let game_id = game
                .attr("objectid")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("<{}> without objectid", game.tag))?;
            Ok(GameDetails {
                game_id: game_id.to_string(),
                cells: extract_cells(game),
            })
        })
        .collect()
}

fn text_cell(el: Option<&Element>) -> Cell {
    match el.map(|e| e.text.trim()) {
        Some(text) if !text.is_empty() => Cell::Value(text.to_string()),
        _ => Cell::Absent,
    }
}

/// Read every schema column from one game element. Nothing is left
/// unfetched: a column the response lacks becomes [`Cell::Absent`].
pub fn extract_cells(game: &Element) -> Vec<Cell> {
    FIELDS
        .iter()
        .map(|field| {
            let cell = match field.arity {
                Arity::Primary => {
                    let names = game.find_all(field.path);
                    let chosen = names
                        .iter()
                        .find(|e| e.has_attr("primary"))
                        .or(names.first())
                        .copied();
                    text_cell(chosen)
                }
                Arity::Single => text_cell(game.find(field.path)),
                Arity::Multi => {
                    let values = game
                        .find_all(field.path)
                        .into_iter()
                        .map(|e| e.text.trim())
                        .filter(|t| !t.is_empty())
                        .join(MULTI_SEPARATOR);
                    if values.is_empty() {
                        Cell::Absent
                    } else {
                        Cell::Value(values)
                    }
                }
            };
            if !cell.survives_reload(field.placeholder) {
                warn!(
                    game_id = game.attr("objectid").unwrap_or_default(),
                    column = field.column,
                    value = cell.value().unwrap_or_default(),
                    "value is spelled like a table sentinel and will not reload as written"
                );
            }
            cell
        })
        .collect()
}

/// Enrich the first `batch_size` unenriched rows and overwrite `table_path`.
///
/// The response is fetched and parsed before any row is touched, so a failed
/// request leaves both the table and the file as they were. With nothing
/// pending, no request is made and the file is not rewritten.
pub async fn enrich_batch(
    table: &mut Table,
    api: &XmlApi<'_>,
    batch_size: usize,
    table_path: &Path,
) -> Result<BatchReport> {
    let ids = table.pending_ids(batch_size);
    if ids.is_empty() {
        info!("no unenriched rows left");
        return Ok(BatchReport::default());
    }

    let games = api.fetch(&ids).await?;

    let mut report = BatchReport {
        requested: ids.len(),
        returned: games.len(),
        ..BatchReport::default()
    };
    let mut seen = HashSet::new();
    for game in games {
        match table.get_by_id_mut(&game.game_id) {
            Some(row) => {
                info!(game_id = %game.game_id, rank = row.rank, "inserting details");
                row.overwrite(game.cells);
                report.updated += 1;
                seen.insert(game.game_id);
            }
            None => warn!(game_id = %game.game_id, "response has a game not in the table"),
        }
    }
    let missing: Vec<&String> = ids.iter().filter(|id| !seen.contains(*id)).collect();
    if !missing.is_empty() {
        warn!(?missing, "requested games absent from response; they stay pending");
    }

    table.save(table_path)?;
    report.remaining = table.pending_count();
    info!(
        requested = report.requested,
        updated = report.updated,
        remaining = report.remaining,
        "batch written"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// An API document with a full record for each id; `bare` ids get only
    /// their objectid and a name.
    pub fn api_response(ids: &[&str], bare: &[&str]) -> String {
        let games: String = ids
            .iter()
            .map(|id| {
                if bare.contains(id) {
                    return format!(
                        r#"<boardgame objectid="{id}"><name primary="true">Bare {id}</name></boardgame>"#
                    );
                }
                format!(
                    r#"<boardgame objectid="{id}">
  <yearpublished>2017</yearpublished>
  <minplayers>1</minplayers>
  <maxplayers>4</maxplayers>
  <playingtime>120</playingtime>
  <minplaytime>60</minplaytime>
  <maxplaytime>120</maxplaytime>
  <age>14</age>
  <name sortindex="1">Alt {id}</name>
  <name primary="true" sortindex="1">Game {id}</name>
  <thumbnail>https://cf.geekdo-images.com/{id}_t.jpg</thumbnail>
  <image>https://cf.geekdo-images.com/{id}.jpg</image>
  <boardgamepublisher objectid="1">Cephalofair Games</boardgamepublisher>
  <boardgamepublisher objectid="2">Albi</boardgamepublisher>
  <boardgamemechanic objectid="3">Action Queue</boardgamemechanic>
  <boardgamemechanic objectid="4">Hand Management</boardgamemechanic>
  <boardgamecategory objectid="5">Adventure</boardgamecategory>
  <boardgamedesigner objectid="6">Isaac Childres</boardgamedesigner>
  <statistics page="1">
    <ratings>
      <usersrated>60000</usersrated>
      <average>8.6</average>
      <bayesaverage>8.4</bayesaverage>
      <owned>90000</owned>
      <averageweight>3.9</averageweight>
    </ratings>
  </statistics>
</boardgame>"#
                )
            })
            .collect();
        format!(r#"<?xml version="1.0" encoding="utf-8"?><boardgames termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">{games}</boardgames>"#)
    }

    /// Ids requested by a batch URL.
    pub fn ids_in(url: &str) -> Vec<String> {
        let tail = url.split("/boardgame/").nth(1).unwrap_or("");
        tail.split('?')
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
