use std::path::PathBuf;
use std::time::Duration;

use crate::util::env::{env_opt, parse_with};

pub const DEFAULT_SITE_BASE: &str = "https://boardgamegeek.com";
pub const DEFAULT_API_BASE: &str = "https://www.boardgamegeek.com/xmlapi";

/// Everything a run needs besides the command-line toggles.
///
/// Loaded once in `main` and handed to each phase by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Origin of the ranked listing pages; detail URLs are resolved against it.
    pub site_base: String,
    /// Root of the XML API (the `boardgame/<ids>` path is appended).
    pub api_base: String,
    pub output_dir: PathBuf,
    /// When set, a timestamped log file is written here next to stderr output.
    pub log_dir: Option<PathBuf>,
    pub table_file: String,
    pub mosaic_file: String,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            site_base: DEFAULT_SITE_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            output_dir: PathBuf::from("."),
            log_dir: None,
            table_file: "bgg_db.csv".to_string(),
            mosaic_file: "bgg_mosaic.png".to_string(),
            thumb_width: 150,
            thumb_height: 150,
            grid_rows: 10,
            grid_cols: 10,
            http_timeout: Duration::from_secs(30),
            user_agent: format!("bgg-pull/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RunConfig {
    /// Read `BGG_*` variables (after loading `.env`), falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(env_opt)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let timeout_secs = parse_with(&lookup, "BGG_HTTP_TIMEOUT_SECS", d.http_timeout.as_secs());
        Self {
            site_base: lookup("BGG_SITE_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.site_base),
            api_base: lookup("BGG_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.api_base),
            output_dir: lookup("BGG_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            log_dir: lookup("BGG_LOG_DIR").map(PathBuf::from),
            table_file: lookup("BGG_TABLE_FILE").unwrap_or(d.table_file),
            mosaic_file: lookup("BGG_MOSAIC_FILE").unwrap_or(d.mosaic_file),
            thumb_width: parse_with(&lookup, "BGG_THUMB_WIDTH", d.thumb_width),
            thumb_height: parse_with(&lookup, "BGG_THUMB_HEIGHT", d.thumb_height),
            grid_rows: parse_with(&lookup, "BGG_GRID_ROWS", d.grid_rows),
            grid_cols: parse_with(&lookup, "BGG_GRID_COLS", d.grid_cols),
            http_timeout: Duration::from_secs(timeout_secs),
            user_agent: lookup("BGG_USER_AGENT").unwrap_or(d.user_agent),
        }
    }

    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(&self.table_file)
    }

    pub fn mosaic_path(&self) -> PathBuf {
        self.output_dir.join(&self.mosaic_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let cfg = RunConfig::from_lookup(|_: &str| None);
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.table_path(), PathBuf::from("./bgg_db.csv"));
    }

    #[test]
    fn overrides_are_applied_and_bases_lose_trailing_slash() {
        let cfg = RunConfig::from_lookup(lookup_from(&[
            ("BGG_SITE_BASE", "http://localhost:8080/"),
            ("BGG_OUTPUT_DIR", "/tmp/bgg"),
            ("BGG_LOG_DIR", "/tmp/bgg/logs"),
            ("BGG_MOSAIC_FILE", "wall.png"),
            ("BGG_GRID_COLS", "5"),
            ("BGG_THUMB_HEIGHT", "not-a-number"),
            ("BGG_HTTP_TIMEOUT_SECS", "9"),
        ]));
        assert_eq!(cfg.site_base, "http://localhost:8080");
        assert_eq!(cfg.mosaic_path(), PathBuf::from("/tmp/bgg/wall.png"));
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/bgg/logs")));
        assert_eq!(cfg.grid_cols, 5);
        assert_eq!(cfg.thumb_height, 150);
        assert_eq!(cfg.http_timeout, Duration::from_secs(9));
    }
}
