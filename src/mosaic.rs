//! Thumbnail wall: the first `rows * cols` games pasted onto one canvas.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::{imageops, RgbaImage};
use tracing::{info, warn};

use crate::http::{Fetcher, Throttle};
use crate::schema::field_index;
use crate::table::Table;

/// Horizontal gap after each pasted thumbnail.
pub const GUTTER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl Grid {
    pub fn cells(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Canvas dimensions, or an error when the grid is too large to allocate.
    pub fn canvas_size(&self) -> Result<(u32, u32)> {
        let too_large = || {
            anyhow!(
                "mosaic grid {}x{} of {}x{} cells is too large",
                self.cols,
                self.rows,
                self.cell_width,
                self.cell_height
            )
        };
        let width = self.cols.checked_mul(self.cell_width).ok_or_else(too_large)?;
        let height = self.rows.checked_mul(self.cell_height).ok_or_else(too_large)?;
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(too_large)?;
        Ok((width, height))
    }
}

/// Paste position tracker.
///
/// `x` advances by each image's own width plus [`GUTTER`]; after `cols`
/// images it returns to 0 and `y` moves down one configured cell height,
/// whatever the pasted images measured.
#[derive(Debug, Clone, Copy)]
pub struct PasteCursor {
    x: i64,
    y: i64,
    placed: usize,
    cols: usize,
    cell_height: i64,
}

impl PasteCursor {
    pub fn new(grid: &Grid) -> Self {
        Self {
            x: 0,
            y: 0,
            placed: 0,
            cols: grid.cols.max(1) as usize,
            cell_height: i64::from(grid.cell_height),
        }
    }

    /// Top-left corner for the next image, then advance past it.
    pub fn place(&mut self, width: u32) -> (i64, i64) {
        let at = (self.x, self.y);
        self.placed += 1;
        self.x += i64::from(width) + i64::from(GUTTER);
        if self.placed % self.cols == 0 {
            self.x = 0;
            self.y += self.cell_height;
        }
        at
    }
}

/// Positions for images of the given widths, in paste order.
pub fn layout(widths: &[u32], grid: &Grid) -> Vec<(i64, i64)> {
    let mut cursor = PasteCursor::new(grid);
    widths.iter().map(|w| cursor.place(*w)).collect()
}

/// Thumbnail URLs of the first `grid.cells()` rows. A row without one fails.
pub fn thumbnail_urls(table: &Table, grid: &Grid) -> Result<Vec<String>> {
    let at = field_index("thumb_url").ok_or_else(|| anyhow!("schema has no thumb_url column"))?;
    if table.len() < grid.cells() {
        warn!(
            rows = table.len(),
            cells = grid.cells(),
            "table smaller than the grid; mosaic will be partial"
        );
    }
    table
        .rows()
        .iter()
        .take(grid.cells())
        .map(|row| {
            row.cells()[at]
                .value()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("rank {} (game {}) has no thumbnail url", row.rank, row.game_id))
        })
        .collect()
}

/// Fetch each thumbnail in row order and paste it onto a transparent canvas.
/// Any failed fetch or undecodable image aborts the render.
pub async fn render_mosaic(
    table: &Table,
    grid: &Grid,
    fetcher: &dyn Fetcher,
    throttle: Throttle,
) -> Result<RgbaImage> {
    if grid.rows == 0 || grid.cols == 0 {
        bail!("mosaic grid must have at least one row and column");
    }
    let (width, height) = grid.canvas_size()?;
    let urls = thumbnail_urls(table, grid)?;
    let mut canvas = RgbaImage::new(width, height);

    let mut cursor = PasteCursor::new(grid);
    for (i, url) in urls.iter().enumerate() {
        let resp = fetcher.get(url).await?.error_for_status(url)?;
        let thumb = image::load_from_memory(&resp.body)
            .with_context(|| format!("decode thumbnail {url}"))?
            .to_rgba8();
        let (x, y) = cursor.place(thumb.width());
        imageops::overlay(&mut canvas, &thumb, x, y);
        info!(index = i, %url, x, y, "thumbnail placed");
        throttle.pause().await;
    }
    Ok(canvas)
}

/// Write the mosaic; the format follows the file extension.
pub fn write_mosaic(canvas: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    canvas
        .save(path)
        .with_context(|| format!("write mosaic {}", path.display()))?;
    info!(path = %path.display(), width = canvas.width(), height = canvas.height(), "mosaic written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StubFetcher;
    use crate::http::{Fetched, POLITE_PAUSE};
    use crate::schema::FIELDS;
    use crate::table::{Cell, GameRow};
    use image::{DynamicImage, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(w: u32, h: u32, shade: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([shade, shade, shade, 255]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn table_with_thumbs(n: u32) -> Table {
        let at = field_index("thumb_url").unwrap();
        let mut t = Table::new();
        for rank in 1..=n {
            let mut row = GameRow::new(rank, rank.to_string(), format!("u{rank}"));
            let mut cells = vec![Cell::Absent; FIELDS.len()];
            cells[at] = Cell::Value(format!("https://cf.geekdo-images.com/{rank}.png"));
            row.overwrite(cells);
            t.push(row).unwrap();
        }
        t
    }

    #[test]
    fn sixth_image_wraps_by_configured_height() {
        let grid = Grid {
            rows: 2,
            cols: 5,
            cell_width: 100,
            cell_height: 80,
        };
        // thumbnails shorter and taller than the cell
        let widths = [90, 60, 120, 100, 75, 50];
        let pos = layout(&widths, &grid);
        assert_eq!(pos[0], (0, 0));
        assert_eq!(pos[1], (100, 0));
        assert_eq!(pos[4], (100 + 70 + 130 + 110, 0));
        assert_eq!(pos[5], (0, 80));
    }

    #[tokio::test]
    async fn renders_canvas_from_fetched_thumbnails() {
        let stub = StubFetcher::new(|url: &str| {
            let shade = if url.ends_with("/1.png") { 10 } else { 200 };
            Ok(Fetched::ok(png(20, 30, shade)))
        });
        let grid = Grid {
            rows: 1,
            cols: 2,
            cell_width: 40,
            cell_height: 30,
        };
        let canvas = render_mosaic(&table_with_thumbs(3), &grid, &stub, Throttle::none())
            .await
            .unwrap();

        assert_eq!(stub.calls().len(), 2);
        assert_eq!(canvas.dimensions(), (80, 30));
        assert_eq!(canvas.get_pixel(5, 5), &Rgba([10, 10, 10, 255]));
        // gutter stays transparent, second image starts at 20 + 10
        assert_eq!(canvas.get_pixel(25, 5)[3], 0);
        assert_eq!(canvas.get_pixel(31, 5), &Rgba([200, 200, 200, 255]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("mosaic.png");
        write_mosaic(&canvas, &path).unwrap();
        assert_eq!(image::open(&path).unwrap().to_rgba8(), canvas);
    }

    #[tokio::test]
    async fn undecodable_thumbnail_aborts() {
        let stub = StubFetcher::new(|_: &str| Ok(Fetched::ok("not an image")));
        let grid = Grid {
            rows: 1,
            cols: 1,
            cell_width: 10,
            cell_height: 10,
        };
        let err = render_mosaic(&table_with_thumbs(1), &grid, &stub, Throttle::none())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("decode thumbnail"));
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_each_thumbnail() {
        let stub = StubFetcher::new(|_: &str| Ok(Fetched::ok(png(4, 4, 90))));
        let grid = Grid {
            rows: 1,
            cols: 2,
            cell_width: 4,
            cell_height: 4,
        };
        let started = tokio::time::Instant::now();
        render_mosaic(&table_with_thumbs(2), &grid, &stub, Throttle::polite())
            .await
            .unwrap();
        assert_eq!(stub.calls().len(), 2);
        assert_eq!(started.elapsed(), POLITE_PAUSE * 2);
    }

    #[tokio::test]
    async fn oversized_grid_is_rejected_before_fetching() {
        let grid = Grid {
            rows: 1,
            cols: 70_000,
            cell_width: 70_000,
            cell_height: 10,
        };
        assert!(grid.canvas_size().is_err());
        let stub = StubFetcher::new(|_: &str| Ok(Fetched::ok(png(4, 4, 90))));
        let err = render_mosaic(&table_with_thumbs(1), &grid, &stub, Throttle::none())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert!(stub.calls().is_empty());
        let default_grid = Grid {
            rows: 10,
            cols: 10,
            cell_width: 150,
            cell_height: 150,
        };
        assert_eq!(default_grid.canvas_size().unwrap(), (1500, 1500));
    }

    #[test]
    fn unenriched_row_has_no_thumbnail() {
        let mut t = Table::new();
        t.push(GameRow::new(1, "1", "u")).unwrap();
        let grid = Grid {
            rows: 1,
            cols: 1,
            cell_width: 10,
            cell_height: 10,
        };
        assert!(thumbnail_urls(&t, &grid).is_err());
    }
}
