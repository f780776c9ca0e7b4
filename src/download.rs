//! Per-scene download orchestration.
//!
//! Ties the pieces together for one scene: resolve bands to assets, sign
//! the hrefs, read each band's window, stack, save.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::bands::{resolve_assets, Band};
use crate::catalog::{CatalogClient, Scene};
use crate::cog::CogReader;
use crate::composite::{assemble, SceneRaster};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::range_reader::HttpRangeReader;
use crate::save::save_scene;
use crate::window::{read_window, window_from_bbox};

/// Fetch the window of every listed asset and stack them in order.
///
/// `assets` carries already-signed hrefs.
pub fn clip_scene(
    scene: &Scene,
    assets: &[(Band, String)],
    bbox: &BoundingBox,
) -> Result<SceneRaster> {
    clip_scene_with(scene, assets, bbox, &|href| CogReader::open(href))
}

/// Same as [`clip_scene`] with an injectable asset opener, so callers
/// without network access (tests) can supply in-memory readers.
pub fn clip_scene_with(
    scene: &Scene,
    assets: &[(Band, String)],
    bbox: &BoundingBox,
    open: &dyn Fn(&str) -> Result<CogReader>,
) -> Result<SceneRaster> {
    let mut windows = Vec::with_capacity(assets.len());
    let mut first_profile = None;

    for (band, href) in assets {
        let reader = open(href)?;
        let window = window_from_bbox(&reader.profile, bbox)?;
        debug!(band = %band, scene = %scene.id, ?window, "reading band window");
        let band_window = read_window(&reader, &window)?;
        if first_profile.is_none() {
            first_profile = Some(reader.profile.clone());
        }
        windows.push((*band, band_window));
    }

    let Some(profile) = first_profile else {
        return Err(Error::EmptyWindow);
    };
    assemble(scene, &windows, &profile)
}

/// Process one scene end to end: resolve, sign, fetch, assemble, save.
///
/// `report_sizes` adds a HEAD request per asset to log how much a full
/// download would have cost; the range reads fetch a fraction of it.
pub fn process_scene(
    client: &mut CatalogClient,
    scene: &Scene,
    bands: &[Band],
    bbox: &BoundingBox,
    out_dir: &Path,
    report_sizes: bool,
) -> Result<PathBuf> {
    let assets = resolve_assets(scene, bands, client.api())?;

    let mut signed = Vec::with_capacity(assets.len());
    for (band, href) in assets {
        signed.push((band, client.sign(&href)?));
    }

    if report_sizes {
        let mut total: u64 = 0;
        for (band, href) in &signed {
            if let Some(size) = client.head_size(href) {
                let size_mb = size as f64 / 1_048_576.0;
                info!(band = %band, size_mb, "full asset size");
                total += size;
            }
        }
        if total > 0 {
            let total_mb = total as f64 / 1_048_576.0;
            info!(
                total_mb,
                "estimated full-download size; range reads fetch only the window"
            );
        }
    }

    // Reuse the catalog client's connection pool across band assets
    let http = client.http().clone();
    let open = move |href: &str| -> Result<CogReader> {
        if href.starts_with("http://") || href.starts_with("https://") {
            let reader = HttpRangeReader::with_client(href, http.clone())?;
            CogReader::from_reader(Arc::new(reader))
        } else {
            CogReader::open(href)
        }
    };

    let raster = clip_scene_with(scene, &signed, bbox, &open)?;
    save_scene(&raster, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_reader::MemoryRangeReader;
    use crate::test_cog::{cog_bytes, TestCog};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn test_scene() -> Scene {
        Scene {
            id: "S2A_CLIP".to_string(),
            datetime: "2024-01-20T10:30:00Z".to_string(),
            acquired: "2024-01-20T10:30:00Z".parse().unwrap(),
            cloud_cover: 2.0,
            platform: Some("sentinel-2a".to_string()),
            assets: HashMap::new(),
        }
    }

    fn opener(
        cogs: HashMap<String, Vec<u8>>,
    ) -> impl Fn(&str) -> Result<CogReader> {
        move |href: &str| {
            let bytes = cogs
                .get(href)
                .unwrap_or_else(|| panic!("unexpected asset href {href}"))
                .clone();
            CogReader::from_reader(Arc::new(MemoryRangeReader::new(bytes, href)))
        }
    }

    /// The test grid sits at UTM 31N around (448216 E, 5411840 N), which
    /// is (2.2934 E, 48.8587 N).
    fn test_grid_10m() -> TestCog {
        let mut cog = TestCog::gradient(512, 512, 64, 64);
        cog.tiepoint = [0.0, 0.0, 0.0, 445500.0, 5414500.0, 0.0];
        cog
    }

    #[test]
    fn test_clip_scene_stacks_requested_bands() {
        let cog = test_grid_10m();
        let mut cogs = HashMap::new();
        for band in ["B04", "B03", "B02"] {
            cogs.insert(format!("mem://{band}.tif"), cog_bytes(&cog));
        }

        let assets = vec![
            (Band::B04, "mem://B04.tif".to_string()),
            (Band::B03, "mem://B03.tif".to_string()),
            (Band::B02, "mem://B02.tif".to_string()),
        ];
        let bbox = BoundingBox::around(crate::geometry::Point::lonlat(2.2934, 48.8587), 0.5);

        let raster = clip_scene_with(&test_scene(), &assets, &bbox, &opener(cogs)).unwrap();
        assert_eq!(raster.bands(), 3);
        assert_eq!(raster.meta.bands, vec![Band::B04, Band::B03, Band::B02]);
        assert!(raster.width() < 512 && raster.height() < 512);
    }

    #[test]
    fn test_mixed_resolutions_fail_the_dimension_check() {
        let cog_10m = test_grid_10m();
        let mut cog_20m = TestCog::gradient(256, 256, 64, 64);
        cog_20m.pixel_scale = [20.0, 20.0, 0.0];
        cog_20m.tiepoint = cog_10m.tiepoint;

        let mut cogs = HashMap::new();
        cogs.insert("mem://B04.tif".to_string(), cog_bytes(&cog_10m));
        cogs.insert("mem://B11.tif".to_string(), cog_bytes(&cog_20m));

        let assets = vec![
            (Band::B04, "mem://B04.tif".to_string()),
            (Band::B11, "mem://B11.tif".to_string()),
        ];
        let bbox = BoundingBox::around(crate::geometry::Point::lonlat(2.2934, 48.8587), 0.5);

        let err = clip_scene_with(&test_scene(), &assets, &bbox, &opener(cogs)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { band: Band::B11, .. }));
    }

    #[test]
    fn test_empty_asset_list_is_rejected() {
        let bbox = BoundingBox::around(crate::geometry::Point::lonlat(2.2934, 48.8587), 0.5);
        let err =
            clip_scene_with(&test_scene(), &[], &bbox, &opener(HashMap::new())).unwrap_err();
        assert!(matches!(err, Error::EmptyWindow));
    }
}
