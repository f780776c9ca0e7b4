//! Sentinel-2 spectral band identifiers and asset resolution.
//!
//! The two supported catalogs expose the same underlying products under
//! different asset keys: Planetary Computer keeps the ESA band names
//! (`B02`, `B03`, ...) while Earth Search uses descriptive names
//! (`blue`, `green`, ...). [`Band`] is the catalog-independent identifier;
//! [`resolve_assets`] maps a band list onto one scene's asset hrefs.

use std::fmt;
use std::str::FromStr;

use crate::catalog::{CatalogApi, Scene};
use crate::error::{Error, Result};

/// A Sentinel-2 spectral band.
///
/// The set is closed: anything outside `B01..B12` fails to parse. Note
/// that L2A products do not ship a cirrus asset, so `B10` parses but will
/// not resolve against real scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B09,
    B10,
    B11,
    B12,
}

impl Band {
    /// All supported bands, in spectral order.
    pub const ALL: [Band; 12] = [
        Band::B01,
        Band::B02,
        Band::B03,
        Band::B04,
        Band::B05,
        Band::B06,
        Band::B07,
        Band::B08,
        Band::B09,
        Band::B10,
        Band::B11,
        Band::B12,
    ];

    /// Canonical ESA name, e.g. `"B04"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B09 => "B09",
            Band::B10 => "B10",
            Band::B11 => "B11",
            Band::B12 => "B12",
        }
    }

    /// Native ground sampling distance in meters.
    ///
    /// Bands with different sampling distances produce differently sized
    /// pixel windows for the same bounding box, which the assembler
    /// rejects; this lets the CLI warn up front about mixed requests.
    #[must_use]
    pub fn ground_sampling_m(&self) -> u32 {
        match self {
            Band::B02 | Band::B03 | Band::B04 | Band::B08 => 10,
            Band::B05 | Band::B06 | Band::B07 | Band::B11 | Band::B12 => 20,
            Band::B01 | Band::B09 | Band::B10 => 60,
        }
    }

    /// Asset key under which the given catalog publishes this band.
    #[must_use]
    pub fn asset_key(&self, api: CatalogApi) -> &'static str {
        match api {
            CatalogApi::Microsoft => self.name(),
            CatalogApi::Element84 => match self {
                Band::B01 => "coastal",
                Band::B02 => "blue",
                Band::B03 => "green",
                Band::B04 => "red",
                Band::B05 => "rededge1",
                Band::B06 => "rededge2",
                Band::B07 => "rededge3",
                Band::B08 => "nir",
                Band::B09 => "nir09",
                // L2A products have no cirrus asset under either catalog;
                // resolution reports BandNotAvailable.
                Band::B10 => "cirrus",
                Band::B11 => "swir16",
                Band::B12 => "swir22",
            },
        }
    }
}

impl FromStr for Band {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Band::ALL
            .iter()
            .copied()
            .find(|band| band.name() == normalized)
            .ok_or_else(|| Error::UnsupportedBand(s.to_string()))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve the requested bands to `(band, href)` pairs within one scene,
/// preserving the requested order.
pub fn resolve_assets(scene: &Scene, bands: &[Band], api: CatalogApi) -> Result<Vec<(Band, String)>> {
    let mut resolved = Vec::with_capacity(bands.len());
    for &band in bands {
        let href = scene
            .assets
            .get(band.asset_key(api))
            .ok_or_else(|| Error::BandNotAvailable {
                scene: scene.id.clone(),
                band,
            })?;
        resolved.push((band, href.clone()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Scene;
    use std::collections::HashMap;

    fn scene_with_assets(keys: &[&str]) -> Scene {
        let assets: HashMap<String, String> = keys
            .iter()
            .map(|k| ((*k).to_string(), format!("https://example.com/{k}.tif")))
            .collect();
        Scene {
            id: "S2B_TEST".to_string(),
            datetime: "2024-01-14T10:30:21Z".to_string(),
            acquired: "2024-01-14T10:30:21Z".parse().unwrap(),
            cloud_cover: 3.5,
            platform: Some("sentinel-2b".to_string()),
            assets,
        }
    }

    #[test]
    fn parses_all_supported_bands() {
        for band in Band::ALL {
            assert_eq!(band.name().parse::<Band>().unwrap(), band);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("b04".parse::<Band>().unwrap(), Band::B04);
        assert_eq!(" B02 ".parse::<Band>().unwrap(), Band::B02);
    }

    #[test]
    fn rejects_identifiers_outside_the_set() {
        for bad in ["B00", "B13", "B8A", "red", "04", ""] {
            let err = bad.parse::<Band>().unwrap_err();
            assert!(matches!(err, Error::UnsupportedBand(_)), "{bad} parsed");
        }
    }

    #[test]
    fn microsoft_keys_are_esa_names() {
        assert_eq!(Band::B04.asset_key(CatalogApi::Microsoft), "B04");
        assert_eq!(Band::B12.asset_key(CatalogApi::Microsoft), "B12");
    }

    #[test]
    fn element84_keys_are_color_names() {
        assert_eq!(Band::B02.asset_key(CatalogApi::Element84), "blue");
        assert_eq!(Band::B08.asset_key(CatalogApi::Element84), "nir");
        assert_eq!(Band::B11.asset_key(CatalogApi::Element84), "swir16");
    }

    #[test]
    fn resolve_preserves_request_order() {
        let scene = scene_with_assets(&["B02", "B03", "B04"]);
        let resolved =
            resolve_assets(&scene, &[Band::B04, Band::B03, Band::B02], CatalogApi::Microsoft)
                .unwrap();
        let order: Vec<Band> = resolved.iter().map(|(b, _)| *b).collect();
        assert_eq!(order, vec![Band::B04, Band::B03, Band::B02]);
        assert!(resolved[0].1.ends_with("B04.tif"));
    }

    #[test]
    fn resolve_reports_missing_asset() {
        let scene = scene_with_assets(&["B02"]);
        let err = resolve_assets(&scene, &[Band::B10], CatalogApi::Microsoft).unwrap_err();
        match err {
            Error::BandNotAvailable { band, scene } => {
                assert_eq!(band, Band::B10);
                assert_eq!(scene, "S2B_TEST");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sampling_distances_match_the_product() {
        assert_eq!(Band::B04.ground_sampling_m(), 10);
        assert_eq!(Band::B11.ground_sampling_m(), 20);
        assert_eq!(Band::B01.ground_sampling_m(), 60);
    }
}
