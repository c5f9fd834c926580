//! Enrichment columns of the game table and where each one comes from in the
//! XML API response. Scraper, table and enricher all iterate [`FIELDS`], so a
//! new column is one new entry here.

/// How many matching XML elements feed one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// First element flagged `primary`, else the first element.
    Primary,
    /// First element's text.
    Single,
    /// Every element's text, joined with [`MULTI_SEPARATOR`].
    Multi,
}

/// What an unfetched cell looks like on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Literal [`TEXT_PLACEHOLDER`].
    Text,
    /// Empty cell.
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub column: &'static str,
    /// Slash-separated path below the per-game element.
    pub path: &'static str,
    pub arity: Arity,
    pub placeholder: Placeholder,
}

const fn field(
    path: &'static str,
    column: &'static str,
    arity: Arity,
    placeholder: Placeholder,
) -> Field {
    Field {
        column,
        path,
        arity,
        placeholder,
    }
}

use Arity::{Multi, Primary, Single};
use Placeholder::{Numeric, Text};

pub const FIELDS: &[Field] = &[
    field("name", "name", Primary, Text),
    field("minplayers", "min_players", Single, Numeric),
    field("maxplayers", "max_players", Single, Numeric),
    field("playingtime", "avg_time", Single, Numeric),
    field("minplaytime", "min_time", Single, Numeric),
    field("maxplaytime", "max_time", Single, Numeric),
    field("yearpublished", "year", Single, Numeric),
    field("statistics/ratings/average", "avg_rating", Single, Numeric),
    field("statistics/ratings/bayesaverage", "geek_rating", Single, Numeric),
    field("statistics/ratings/usersrated", "num_votes", Single, Numeric),
    field("image", "image_url", Single, Text),
    field("thumbnail", "thumb_url", Single, Text),
    field("age", "age", Single, Numeric),
    field("boardgamemechanic", "mechanic", Multi, Text),
    field("statistics/ratings/owned", "owned", Single, Numeric),
    field("boardgamecategory", "category", Multi, Text),
    field("boardgamedesigner", "designer", Multi, Text),
    field("boardgamepublisher", "publisher", Single, Text),
    field("statistics/ratings/averageweight", "weight", Single, Numeric),
];

/// Leading key columns of the persisted table, before the [`FIELDS`] columns.
pub const RANK_COLUMN: &str = "rank";
pub const URL_COLUMN: &str = "bgg_url";
pub const ID_COLUMN: &str = "game_id";

/// A row whose cell in this column is unfetched still needs enrichment.
pub const COMPLETENESS_COLUMN: &str = "min_players";

pub const TEXT_PLACEHOLDER: &str = "x";
/// Written when the API was asked but returned nothing for the column.
pub const NONE_SENTINEL: &str = "none";
pub const MULTI_SEPARATOR: &str = ", ";

/// Position of `column` in [`FIELDS`].
pub fn field_index(column: &str) -> Option<usize> {
    FIELDS.iter().position(|f| f.column == column)
}

/// Full CSV header in persisted order.
pub fn header() -> Vec<&'static str> {
    [RANK_COLUMN, URL_COLUMN, ID_COLUMN]
        .into_iter()
        .chain(FIELDS.iter().map(|f| f.column))
        .collect()
}
