//! # s2clip - Point-centered Sentinel-2 scene downloader
//!
//! Given a latitude/longitude, searches a STAC catalog (Microsoft
//! Planetary Computer or Element84 Earth Search) for Sentinel-2 L2A
//! scenes filtered by date range and cloud cover, then downloads the
//! requested spectral bands - reading only the COG tiles that cover a
//! bounding box around the point via HTTP range requests - and writes
//! one GeoTIFF per scene with the catalog metadata embedded.
//!
//! ## Features
//!
//! - **Metadata-only asset opens**: only the TIFF header and first IFD
//!   are read before deciding which bytes to fetch
//! - **Range requests**: a single ranged GET per band covers the minimal
//!   byte span of the tiles intersecting the bounding box
//! - **Graceful degradation**: servers that ignore `Range` fall back to
//!   a full download, reported but not fatal
//! - **Session signing**: Planetary Computer asset hrefs are signed with
//!   a short-lived SAS token, refreshed when it nears expiry
//! - **Compression**: DEFLATE, LZW, ZSTD, and uncompressed tiles
//! - **Coordinate transforms**: pure Rust proj4rs for WGS84-to-UTM
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use s2clip::{Band, BoundingBox, CatalogApi, CatalogClient, Point};
//!
//! let mut client = CatalogClient::new(CatalogApi::Microsoft)?;
//! let bbox = BoundingBox::around(Point::lonlat(2.2934, 48.8587), 1.5);
//! let scenes = client.search(&bbox, 10.0, (start, end))?;
//!
//! for scene in &scenes {
//!     s2clip::download::process_scene(
//!         &mut client, scene,
//!         &[Band::B04, Band::B03, Band::B02],
//!         &bbox, out_dir.as_ref(), false,
//!     )?;
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`catalog`]: STAC search and SAS token handling
//! - [`bands`]: the `B01..B12` band set and asset resolution
//! - [`cog`]: lightweight COG profile reads and tile decode
//! - [`window`]: bounding box to pixel window to byte-range reads
//! - [`composite`]: band stacking with scene metadata
//! - [`save`]: GeoTIFF persister
//! - [`range_reader`]: I/O abstraction over HTTP/local/memory sources
//! - [`geometry`]: points, bounding boxes, and CRS projections
//! - [`download`]: per-scene orchestration

// ============================================================================
// Public modules
// ============================================================================

pub mod bands;
pub mod catalog;
pub mod cog;
pub mod composite;
pub mod download;
pub mod error;
pub mod geometry;
pub mod range_reader;
pub mod save;
pub mod window;

#[cfg(test)]
pub(crate) mod test_cog;

// ============================================================================
// Errors
// ============================================================================

pub use error::{Error, Result};

// ============================================================================
// Catalog
// ============================================================================

pub use catalog::{CatalogApi, CatalogClient, SasToken, Scene, COLLECTION};

// ============================================================================
// Bands
// ============================================================================

pub use bands::{resolve_assets, Band};

// ============================================================================
// COG Profile & Windows
// ============================================================================

pub use cog::{CogReader, Compression, GeoTransform, RasterProfile, SampleType};
pub use window::{read_window, window_from_bbox, BandWindow, PixelWindow, TileSpan};

// ============================================================================
// Assembly & Persistence
// ============================================================================

pub use composite::{assemble, SceneMetadata, SceneRaster};
pub use save::{encode_geotiff, save_scene};

// ============================================================================
// Geometry & Projections
// ============================================================================

pub use geometry::projection::{is_geographic_crs, project_point};
pub use geometry::{delta_km_to_deg, BoundingBox, Point};

// ============================================================================
// Range Readers (I/O Abstraction)
// ============================================================================

pub use range_reader::{
    create_range_reader, HttpRangeReader, LocalRangeReader, MemoryRangeReader, RangeReader,
};
