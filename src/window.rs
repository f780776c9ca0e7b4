//! Partial raster reads: bounding box to pixel window to byte range.
//!
//! This is where geographic coordinates turn into byte offsets. The
//! bounding box is projected into the asset's CRS, inverted through the
//! stored geotransform into a pixel window, and the window is mapped onto
//! the COG's internal tile grid. The tiles intersecting the window sit
//! close together in well-formed COGs, so a single range request covering
//! their minimal byte span fetches everything needed for one band.

use tracing::debug;

use crate::cog::{CogReader, GeoTransform, RasterProfile};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

/// A rectangular region of a raster's pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    #[inline]
    #[must_use]
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// The byte span and tile range backing one window read.
#[derive(Debug, Clone)]
pub struct TileSpan {
    pub first_tile_col: usize,
    pub last_tile_col: usize,
    pub first_tile_row: usize,
    pub last_tile_row: usize,
    /// Minimal contiguous byte range covering every non-empty
    /// intersecting tile; `None` when all intersecting tiles are sparse.
    pub byte_range: Option<(u64, u64)>,
}

impl TileSpan {
    /// Number of tiles intersecting the window.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        (self.last_tile_col - self.first_tile_col + 1)
            * (self.last_tile_row - self.first_tile_row + 1)
    }

    /// Length of the spanning byte range.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        match self.byte_range {
            Some((start, end)) => end - start,
            None => 0,
        }
    }
}

/// One band's pixels for a window, with the window's own georeferencing.
#[derive(Debug, Clone)]
pub struct BandWindow {
    /// Row-major f32 samples, `width * height` of them.
    pub pixels: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

/// Compute the pixel window covering a geographic bounding box
/// (EPSG:4326), clamped to the raster extent.
pub fn window_from_bbox(profile: &RasterProfile, bbox: &BoundingBox) -> Result<PixelWindow> {
    let raster_crs = profile.crs_code.unwrap_or(4326);
    let projected = bbox.project(4326, raster_crs)?;

    let transform = &profile.geo_transform;
    let top_left = transform.world_to_pixel(projected.minx, projected.maxy);
    let bottom_right = transform.world_to_pixel(projected.maxx, projected.miny);
    let (Some((px0, py0)), Some((px1, py1))) = (top_left, bottom_right) else {
        return Err(Error::Tiff("asset has no geotransform".into()));
    };

    // Outward-rounded window, clamped to the raster
    let col_off = px0.floor().max(0.0) as usize;
    let row_off = py0.floor().max(0.0) as usize;
    let col_end = (px1.ceil().min(profile.width as f64)).max(0.0) as usize;
    let row_end = (py1.ceil().min(profile.height as f64)).max(0.0) as usize;

    if col_end <= col_off || row_end <= row_off {
        return Err(Error::EmptyWindow);
    }

    Ok(PixelWindow {
        col_off,
        row_off,
        width: col_end - col_off,
        height: row_end - row_off,
    })
}

/// Map a pixel window onto the asset's tile grid and compute the minimal
/// byte span covering the intersecting tiles.
pub fn tile_span(profile: &RasterProfile, window: &PixelWindow) -> Result<TileSpan> {
    if window.width == 0 || window.height == 0 {
        return Err(Error::EmptyWindow);
    }

    let first_tile_col = window.col_off / profile.tile_width;
    let last_tile_col = (window.col_off + window.width - 1) / profile.tile_width;
    let first_tile_row = window.row_off / profile.tile_height;
    let last_tile_row = (window.row_off + window.height - 1) / profile.tile_height;

    let mut byte_range: Option<(u64, u64)> = None;
    for tile_row in first_tile_row..=last_tile_row {
        for tile_col in first_tile_col..=last_tile_col {
            let index = tile_row * profile.tiles_across + tile_col;
            let offset = *profile
                .tile_offsets
                .get(index)
                .ok_or_else(|| Error::Tiff(format!("tile index {index} beyond offset table")))?;
            let count = profile.tile_byte_counts[index];
            if count == 0 {
                continue; // sparse tile
            }
            let end = offset + count;
            byte_range = Some(match byte_range {
                Some((start, stop)) => (start.min(offset), stop.max(end)),
                None => (offset, end),
            });
        }
    }

    Ok(TileSpan {
        first_tile_col,
        last_tile_col,
        first_tile_row,
        last_tile_row,
        byte_range,
    })
}

/// Read one band's window with a single ranged request.
///
/// Sparse tiles come back as NaN. For multi-band assets only the first
/// band is sampled; Sentinel-2 band assets are single-band.
pub fn read_window(reader: &CogReader, window: &PixelWindow) -> Result<BandWindow> {
    let profile = &reader.profile;
    if profile.bands > 1 {
        debug!(
            source = reader.source(),
            bands = profile.bands,
            "multi-band asset, sampling first band only"
        );
    }

    let span = tile_span(profile, window)?;
    let mut pixels = vec![f32::NAN; window.area()];

    if let Some((span_start, span_end)) = span.byte_range {
        let span_len = span_end - span_start;
        debug!(
            source = reader.source(),
            tiles = span.tile_count(),
            bytes = span_len,
            total = reader.reader().size(),
            "fetching window span"
        );
        let buffer = reader.reader().read_range(span_start, span_len as usize)?;

        for tile_row in span.first_tile_row..=span.last_tile_row {
            for tile_col in span.first_tile_col..=span.last_tile_col {
                let index = tile_row * profile.tiles_across + tile_col;
                let count = profile.tile_byte_counts[index] as usize;
                if count == 0 {
                    continue;
                }
                let offset = (profile.tile_offsets[index] - span_start) as usize;
                let tile = reader.decode_tile(&buffer[offset..offset + count])?;
                copy_tile_into_window(profile, index, &tile, window, &mut pixels);
            }
        }
    }

    Ok(BandWindow {
        pixels,
        width: window.width,
        height: window.height,
        transform: profile.geo_transform.for_window(window.col_off, window.row_off),
    })
}

/// Copy the intersection of one decoded tile into the window buffer.
fn copy_tile_into_window(
    profile: &RasterProfile,
    tile_index: usize,
    tile: &[f32],
    window: &PixelWindow,
    pixels: &mut [f32],
) {
    let tile_col = tile_index % profile.tiles_across;
    let tile_row = tile_index / profile.tiles_across;
    let tile_x0 = tile_col * profile.tile_width;
    let tile_y0 = tile_row * profile.tile_height;

    let x_start = window.col_off.max(tile_x0);
    let x_end = (window.col_off + window.width).min(tile_x0 + profile.tile_width);
    let y_start = window.row_off.max(tile_y0);
    let y_end = (window.row_off + window.height).min(tile_y0 + profile.tile_height);

    for y in y_start..y_end {
        for x in x_start..x_end {
            // Tile data is always tile_width wide, even for edge tiles
            let tile_idx = ((y - tile_y0) * profile.tile_width + (x - tile_x0)) * profile.bands;
            let out_idx = (y - window.row_off) * window.width + (x - window.col_off);
            if let Some(&value) = tile.get(tile_idx) {
                pixels[out_idx] = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::projection::project_point;
    use crate::range_reader::MemoryRangeReader;
    use crate::test_cog::{cog_bytes, TestCog};
    use std::sync::Arc;

    fn open_test_cog(cog: &TestCog) -> (CogReader, usize) {
        let bytes = cog_bytes(cog);
        let total = bytes.len();
        let reader = MemoryRangeReader::new(bytes, "mem://window.tif");
        (CogReader::from_reader(Arc::new(reader)).unwrap(), total)
    }

    /// Build a 4326 bbox whose projection covers the given UTM rectangle.
    fn bbox_for_utm(minx: f64, miny: f64, maxx: f64, maxy: f64) -> BoundingBox {
        let (lon0, lat0) = project_point(32631, 4326, minx, miny).unwrap();
        let (lon1, lat1) = project_point(32631, 4326, maxx, maxy).unwrap();
        BoundingBox::new(lon0.min(lon1), lat0.min(lat1), lon0.max(lon1), lat0.max(lat1))
    }

    #[test]
    fn test_interior_window_is_smaller_than_raster() {
        let cog = TestCog::gradient(64, 48, 16, 16);
        let (reader, _) = open_test_cog(&cog);

        // UTM rectangle well inside the 640 x 480 m extent
        let bbox = bbox_for_utm(600160.0, 5399680.0, 600320.0, 5399840.0);
        let window = window_from_bbox(&reader.profile, &bbox).unwrap();

        assert!(window.area() > 0);
        assert!(
            window.area() < reader.profile.pixel_area(),
            "window {:?} should cover less than the full {} pixels",
            window,
            reader.profile.pixel_area()
        );
    }

    #[test]
    fn test_window_values_match_source_pixels() {
        let cog = TestCog::gradient(64, 48, 16, 16);
        let (reader, _) = open_test_cog(&cog);

        let window = PixelWindow {
            col_off: 10,
            row_off: 12,
            width: 20,
            height: 9,
        };
        let band = read_window(&reader, &window).unwrap();

        assert_eq!(band.width, 20);
        assert_eq!(band.height, 9);
        for y in 0..band.height {
            for x in 0..band.width {
                let expected = cog.pixel(window.col_off + x, window.row_off + y) as f32;
                assert_eq!(band.pixels[y * band.width + x], expected, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn test_window_transform_matches_source_grid() {
        let cog = TestCog::gradient(64, 48, 16, 16);
        let (reader, _) = open_test_cog(&cog);

        let window = PixelWindow {
            col_off: 8,
            row_off: 4,
            width: 8,
            height: 8,
        };
        let band = read_window(&reader, &window).unwrap();
        let (wx, wy) = band.transform.pixel_to_world(0.0, 0.0).unwrap();
        assert_eq!((wx, wy), (600080.0, 5399960.0));
    }

    #[test]
    fn test_span_is_partial_and_covers_all_tiles() {
        let cog = TestCog::gradient(64, 64, 16, 16);
        let (reader, total_bytes) = open_test_cog(&cog);

        // A window crossing tiles (1,1) and (2,1)
        let window = PixelWindow {
            col_off: 20,
            row_off: 20,
            width: 20,
            height: 8,
        };
        let span = tile_span(&reader.profile, &window).unwrap();

        assert_eq!(span.first_tile_col, 1);
        assert_eq!(span.last_tile_col, 2);
        assert_eq!(span.first_tile_row, 1);
        assert_eq!(span.last_tile_row, 1);
        assert_eq!(span.tile_count(), 2);

        let (start, end) = span.byte_range.unwrap();
        assert!(end as usize <= total_bytes);
        assert!(
            span.byte_len() < total_bytes as u64,
            "span should not cover the whole file"
        );
        // Every intersecting tile lies inside the span
        for index in [5usize, 6] {
            let offset = reader.profile.tile_offsets[index];
            let stop = offset + reader.profile.tile_byte_counts[index];
            assert!(offset >= start && stop <= end);
        }
    }

    #[test]
    fn test_bbox_outside_extent_is_empty() {
        let cog = TestCog::gradient(64, 48, 16, 16);
        let (reader, _) = open_test_cog(&cog);

        // 10 km east of the raster
        let bbox = bbox_for_utm(610000.0, 5399600.0, 610300.0, 5399900.0);
        let err = window_from_bbox(&reader.profile, &bbox).unwrap_err();
        assert!(matches!(err, Error::EmptyWindow));
    }

    #[test]
    fn test_bbox_partially_outside_is_clamped() {
        let cog = TestCog::gradient(64, 48, 16, 16);
        let (reader, _) = open_test_cog(&cog);

        // Overlaps the left edge: west of origin through column ~8
        let bbox = bbox_for_utm(599900.0, 5399700.0, 600080.0, 5399900.0);
        let window = window_from_bbox(&reader.profile, &bbox).unwrap();
        assert_eq!(window.col_off, 0);
        assert!(window.width <= 9);
        assert!(window.area() > 0);
    }
}
