//! The game table: one [`GameRow`] per ranked game, persisted as CSV and
//! rewritten wholesale after every phase that changes it.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::StringRecord;
use tracing::{debug, warn};

use crate::schema::{
    self, Placeholder, COMPLETENESS_COLUMN, FIELDS, ID_COLUMN, NONE_SENTINEL, RANK_COLUMN,
    TEXT_PLACEHOLDER, URL_COLUMN,
};

/// State of one enrichment cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cell {
    /// Never enriched.
    #[default]
    Unfetched,
    /// Enriched, but the API had no value.
    Absent,
    Value(String),
}

impl Cell {
    fn encode(&self, placeholder: Placeholder) -> &str {
        match self {
            Cell::Unfetched => match placeholder {
                Placeholder::Text => TEXT_PLACEHOLDER,
                Placeholder::Numeric => "",
            },
            Cell::Absent => NONE_SENTINEL,
            Cell::Value(v) => v,
        }
    }

    /// Inverse of [`Cell::encode`], except that an API value spelled exactly
    /// like a sentinel (`"none"` anywhere, `"x"` in a text column) reads back
    /// as the sentinel's state. See [`Cell::survives_reload`].
    fn decode(raw: &str, placeholder: Placeholder) -> Self {
        match raw {
            "" => Cell::Unfetched,
            TEXT_PLACEHOLDER if placeholder == Placeholder::Text => Cell::Unfetched,
            NONE_SENTINEL => Cell::Absent,
            other => Cell::Value(other.to_string()),
        }
    }

    /// Whether saving and loading this cell in a column with `placeholder`
    /// gives the same cell back.
    pub fn survives_reload(&self, placeholder: Placeholder) -> bool {
        Cell::decode(self.encode(placeholder), placeholder) == *self
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Cell::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub rank: u32,
    pub game_id: String,
    pub bgg_url: String,
    cells: Vec<Cell>,
}

impl GameRow {
    /// A freshly scraped row: every enrichment cell unfetched.
    pub fn new(rank: u32, game_id: impl Into<String>, bgg_url: impl Into<String>) -> Self {
        Self {
            rank,
            game_id: game_id.into(),
            bgg_url: bgg_url.into(),
            cells: vec![Cell::Unfetched; FIELDS.len()],
        }
    }

    pub fn cell(&self, column: &str) -> Option<&Cell> {
        schema::field_index(column).map(|i| &self.cells[i])
    }

    /// Cells in [`FIELDS`] order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Replace every enrichment cell at once. `cells` must follow [`FIELDS`].
    pub fn overwrite(&mut self, cells: Vec<Cell>) {
        debug_assert_eq!(cells.len(), FIELDS.len());
        self.cells = cells;
    }

    pub fn is_enriched(&self) -> bool {
        !matches!(self.cell(COMPLETENESS_COLUMN), Some(Cell::Unfetched) | None)
    }
}

/// Rows in persisted order with `rank` and `game_id` kept unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<GameRow>,
    by_id: HashMap<String, usize>,
    by_rank: HashMap<u32, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[GameRow] {
        &self.rows
    }

    /// Append a row; fails if its rank or id is already present.
    pub fn push(&mut self, row: GameRow) -> Result<()> {
        if self.by_rank.contains_key(&row.rank) {
            bail!("duplicate rank {} (game {})", row.rank, row.game_id);
        }
        if self.by_id.contains_key(&row.game_id) {
            bail!("duplicate game_id {} (rank {})", row.game_id, row.rank);
        }
        let idx = self.rows.len();
        self.by_rank.insert(row.rank, idx);
        self.by_id.insert(row.game_id.clone(), idx);
        self.rows.push(row);
        Ok(())
    }

    pub fn contains_id(&self, game_id: &str) -> bool {
        self.by_id.contains_key(game_id)
    }

    pub fn contains_rank(&self, rank: u32) -> bool {
        self.by_rank.contains_key(&rank)
    }

    pub fn get_by_id(&self, game_id: &str) -> Option<&GameRow> {
        self.by_id.get(game_id).map(|&i| &self.rows[i])
    }

    pub fn get_by_id_mut(&mut self, game_id: &str) -> Option<&mut GameRow> {
        self.by_id.get(game_id).map(|&i| &mut self.rows[i])
    }

    /// Up to `limit` ids of unenriched rows, in row order.
    pub fn pending_ids(&self, limit: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| !r.is_enriched())
            .take(limit)
            .map(|r| r.game_id.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_enriched()).count()
    }

    /// Overwrite `path` with the whole table.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut wtr =
            csv::Writer::from_path(path).with_context(|| format!("open {}", path.display()))?;
        wtr.write_record(schema::header())?;
        for row in &self.rows {
            let rank = row.rank.to_string();
            let record = [rank.as_str(), row.bgg_url.as_str(), row.game_id.as_str()]
                .into_iter()
                .chain(
                    row.cells
                        .iter()
                        .zip(FIELDS)
                        .map(|(cell, f)| cell.encode(f.placeholder)),
                );
            wtr.write_record(record)
                .with_context(|| format!("write rank {} to {}", row.rank, path.display()))?;
        }
        wtr.flush()
            .with_context(|| format!("flush {}", path.display()))?;
        debug!(rows = self.rows.len(), path = %path.display(), "table saved");
        Ok(())
    }

    /// Read a table previously written by [`Table::save`].
    ///
    /// Columns are matched by header name; an enrichment column missing from
    /// the file loads as unfetched.
    pub fn load(path: &Path) -> Result<Self> {
        let mut rdr =
            csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
        let headers = rdr
            .headers()
            .with_context(|| format!("read header of {}", path.display()))?
            .clone();
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let required = |name: &str| {
            position(name).ok_or_else(|| anyhow!("{} has no `{}` column", path.display(), name))
        };
        let rank_at = required(RANK_COLUMN)?;
        let url_at = required(URL_COLUMN)?;
        let id_at = required(ID_COLUMN)?;
        let field_at: Vec<Option<usize>> = FIELDS.iter().map(|f| position(f.column)).collect();
        for (f, at) in FIELDS.iter().zip(&field_at) {
            if at.is_none() {
                warn!(column = f.column, path = %path.display(), "column missing; treating as unfetched");
            }
        }

        let mut table = Table::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("read {}", path.display()))?;
            let row = decode_row(&record, rank_at, url_at, id_at, &field_at)
                .with_context(|| format!("{} data row {}", path.display(), line + 1))?;
            table
                .push(row)
                .with_context(|| format!("{} data row {}", path.display(), line + 1))?;
        }
        debug!(rows = table.len(), path = %path.display(), "table loaded");
        Ok(table)
    }
}

fn decode_row(
    record: &StringRecord,
    rank_at: usize,
    url_at: usize,
    id_at: usize,
    field_at: &[Option<usize>],
) -> Result<GameRow> {
    let get = |i: usize| record.get(i).unwrap_or("");
    let rank: u32 = get(rank_at)
        .trim()
        .parse()
        .with_context(|| format!("bad rank {:?}", get(rank_at)))?;
    let mut row = GameRow::new(rank, get(id_at).trim(), get(url_at));
    let cells = FIELDS
        .iter()
        .zip(field_at)
        .map(|(f, at)| match at {
            Some(i) => Cell::decode(get(*i), f.placeholder),
            None => Cell::Unfetched,
        })
        .collect();
    row.overwrite(cells);
    Ok(row)
}
