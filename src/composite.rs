//! Stacking band windows into a single in-memory raster.

use ndarray::Array3;

use crate::bands::Band;
use crate::catalog::Scene;
use crate::cog::{GeoTransform, RasterProfile, SampleType};
use crate::error::{Error, Result};
use crate::window::BandWindow;

/// Metadata carried from the catalog entry into the written file.
#[derive(Debug, Clone)]
pub struct SceneMetadata {
    pub scene_id: String,
    /// Acquisition datetime exactly as the catalog reported it.
    pub datetime: String,
    pub cloud_cover: f64,
    pub platform: Option<String>,
    /// Bands in stacking order.
    pub bands: Vec<Band>,
    pub crs_code: Option<i32>,
    /// Georeferencing of the window (not of the full source asset).
    pub transform: GeoTransform,
    /// Sample type of the source asset, used to pick the output format.
    pub sample_type: SampleType,
    pub nodata: Option<f64>,
}

impl SceneMetadata {
    /// Comma-separated band names, e.g. `"B04,B03,B02"`.
    #[must_use]
    pub fn band_list(&self) -> String {
        let names: Vec<&str> = self.bands.iter().map(Band::name).collect();
        names.join(",")
    }
}

/// Multi-band in-memory raster, `(bands, rows, cols)`.
pub struct SceneRaster {
    pub data: Array3<f32>,
    pub meta: SceneMetadata,
}

impl SceneRaster {
    #[must_use]
    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.data.dim().2
    }
}

/// Stack per-band windows into a [`SceneRaster`] in the given order.
///
/// All windows must agree on dimensions; a mismatch means the requested
/// bands have different ground sampling (or the assets are misaligned)
/// and aborts this scene.
pub fn assemble(
    scene: &Scene,
    windows: &[(Band, BandWindow)],
    profile: &RasterProfile,
) -> Result<SceneRaster> {
    let Some((_, first)) = windows.first() else {
        return Err(Error::EmptyWindow);
    };
    let (width, height) = (first.width, first.height);

    for (band, window) in windows {
        if window.width != width || window.height != height {
            return Err(Error::DimensionMismatch {
                band: *band,
                want_width: width,
                want_height: height,
                got_width: window.width,
                got_height: window.height,
            });
        }
    }

    let mut stacked = Vec::with_capacity(windows.len() * width * height);
    for (_, window) in windows {
        stacked.extend_from_slice(&window.pixels);
    }

    let data = Array3::from_shape_vec((windows.len(), height, width), stacked)
        .map_err(|e| Error::Tiff(format!("band stack shape error: {e}")))?;

    Ok(SceneRaster {
        data,
        meta: SceneMetadata {
            scene_id: scene.id.clone(),
            datetime: scene.datetime.clone(),
            cloud_cover: scene.cloud_cover,
            platform: scene.platform.clone(),
            bands: windows.iter().map(|(band, _)| *band).collect(),
            crs_code: profile.crs_code,
            transform: first.transform.clone(),
            sample_type: profile.sample_type,
            nodata: profile.nodata,
        },
    })
}
