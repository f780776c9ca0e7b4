//! Crate-wide error type.
//!
//! Every failure the tool can surface maps to one variant so the CLI can
//! decide between "skip this scene" and "exit non-zero" without string
//! matching.

use crate::bands::Band;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The catalog search returned zero items.
    #[error("no scenes matched the search criteria")]
    NoScenes,

    /// A band identifier outside the supported `B01..B12` set.
    #[error("unsupported band identifier `{0}` (expected B01..B12)")]
    UnsupportedBand(String),

    /// The band is valid but the scene carries no asset for it.
    #[error("scene {scene} has no asset for band {band}")]
    BandNotAvailable { scene: String, band: Band },

    /// Session-token acquisition failed (Microsoft catalog only).
    #[error("catalog authentication failed: {0}")]
    Authentication(String),

    /// Band windows disagree on pixel dimensions.
    #[error("band {band} window is {got_width}x{got_height}, expected {want_width}x{want_height}")]
    DimensionMismatch {
        band: Band,
        want_width: usize,
        want_height: usize,
        got_width: usize,
        got_height: usize,
    },

    /// The bounding box does not overlap the asset's pixel grid.
    #[error("bounding box does not intersect the raster extent")]
    EmptyWindow,

    /// Catalog request or response-shape failure.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Malformed or unsupported GeoTIFF structure.
    #[error("invalid GeoTIFF: {0}")]
    Tiff(String),

    /// Coordinate transformation failure.
    #[error("projection error: {0}")]
    Projection(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
