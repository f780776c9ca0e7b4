//! Lightweight COG (Cloud Optimized `GeoTIFF`) profile reads and tile decode.
//!
//! Opening an asset reads only the TIFF header and first IFD (typically
//! under 16KB), never pixel data:
//! - Dimensions, tiling and data type from TIFF tags
//! - Georeferencing from `ModelPixelScale`/`ModelTiepoint`
//! - CRS detection from the `GeoKey` directory
//! - `NoData` from the GDAL tag
//!
//! Tile data is fetched separately, by whoever knows which tiles are
//! worth fetching (see the `window` module).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::range_reader::{create_range_reader, RangeReader};

// TIFF tag constants
pub(crate) const TAG_IMAGE_WIDTH: u16 = 256;
pub(crate) const TAG_IMAGE_LENGTH: u16 = 257;
pub(crate) const TAG_BITS_PER_SAMPLE: u16 = 258;
pub(crate) const TAG_COMPRESSION: u16 = 259;
pub(crate) const TAG_PHOTOMETRIC: u16 = 262;
pub(crate) const TAG_STRIP_OFFSETS: u16 = 273;
pub(crate) const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub(crate) const TAG_ROWS_PER_STRIP: u16 = 278;
pub(crate) const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub(crate) const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub(crate) const TAG_PREDICTOR: u16 = 317;
pub(crate) const TAG_TILE_WIDTH: u16 = 322;
pub(crate) const TAG_TILE_LENGTH: u16 = 323;
pub(crate) const TAG_TILE_OFFSETS: u16 = 324;
pub(crate) const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub(crate) const TAG_SAMPLE_FORMAT: u16 = 339;
pub(crate) const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const TAG_MODEL_TIEPOINT: u16 = 33922;
pub(crate) const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const TAG_GDAL_METADATA: u16 = 42112;
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

// GeoKey constants
pub(crate) const GEO_KEY_MODEL_TYPE: u16 = 1024;
pub(crate) const GEO_KEY_RASTER_TYPE: u16 = 1025;
pub(crate) const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
pub(crate) const GEO_KEY_PROJECTED_CRS: u16 = 3072;

// Compression constants
const COMPRESSION_NONE: u16 = 1;
const COMPRESSION_LZW: u16 = 5;
const COMPRESSION_DEFLATE: u16 = 8;
const COMPRESSION_ZSTD: u16 = 50000;

// Sample format constants
const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

/// Sample data type detected from TIFF tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::UInt8 | SampleType::Int8 => 1,
            SampleType::UInt16 | SampleType::Int16 => 2,
            SampleType::UInt32 | SampleType::Int32 | SampleType::Float32 => 4,
            SampleType::Float64 => 8,
        }
    }

    /// Detect data type from TIFF tags.
    #[must_use]
    pub fn from_tags(bits_per_sample: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits_per_sample) {
            (SAMPLE_FORMAT_UINT, 8) => Some(SampleType::UInt8),
            (SAMPLE_FORMAT_UINT, 16) => Some(SampleType::UInt16),
            (SAMPLE_FORMAT_UINT, 32) => Some(SampleType::UInt32),
            (SAMPLE_FORMAT_INT, 8) => Some(SampleType::Int8),
            (SAMPLE_FORMAT_INT, 16) => Some(SampleType::Int16),
            (SAMPLE_FORMAT_INT, 32) => Some(SampleType::Int32),
            (SAMPLE_FORMAT_FLOAT, 32) => Some(SampleType::Float32),
            (SAMPLE_FORMAT_FLOAT, 64) => Some(SampleType::Float64),
            // Default to unsigned if sample format not specified
            (_, 8) => Some(SampleType::UInt8),
            (_, 16) => Some(SampleType::UInt16),
            (_, 32) => Some(SampleType::UInt32),
            _ => None,
        }
    }
}

/// Compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
    Zstd,
}

impl Compression {
    #[must_use]
    pub fn from_tag(value: u16) -> Option<Self> {
        match value {
            COMPRESSION_NONE => Some(Compression::None),
            COMPRESSION_LZW => Some(Compression::Lzw),
            COMPRESSION_DEFLATE | 32946 => Some(Compression::Deflate), // 32946 is old deflate
            COMPRESSION_ZSTD => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// `GeoTIFF` transform information.
#[derive(Debug, Clone)]
pub struct GeoTransform {
    /// Pixel scale (`x_scale`, `y_scale`, `z_scale`)
    pub pixel_scale: Option<[f64; 3]>,
    /// Tiepoint (i, j, k, x, y, z) - maps pixel (i,j,k) to world (x,y,z)
    pub tiepoint: Option<[f64; 6]>,
}

impl GeoTransform {
    /// Convert pixel coordinates to world coordinates.
    #[must_use]
    pub fn pixel_to_world(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        let scale = self.pixel_scale?;
        let tie = self.tiepoint?;

        let world_x = tie[3] + (px - tie[0]) * scale[0];
        let world_y = tie[4] - (py - tie[1]) * scale[1]; // Y is typically inverted

        Some((world_x, world_y))
    }

    /// Convert world coordinates to pixel coordinates.
    #[must_use]
    pub fn world_to_pixel(&self, wx: f64, wy: f64) -> Option<(f64, f64)> {
        let scale = self.pixel_scale?;
        let tie = self.tiepoint?;

        if scale[0] == 0.0 || scale[1] == 0.0 {
            return None;
        }

        let px = tie[0] + (wx - tie[3]) / scale[0];
        let py = tie[1] + (tie[4] - wy) / scale[1]; // Y is typically inverted

        Some((px, py))
    }

    /// Derive the transform of a sub-window starting at pixel
    /// (`col_off`, `row_off`).
    #[must_use]
    pub fn for_window(&self, col_off: usize, row_off: usize) -> GeoTransform {
        let origin = self.pixel_to_world(col_off as f64, row_off as f64);
        GeoTransform {
            pixel_scale: self.pixel_scale,
            tiepoint: origin.map(|(x, y)| [0.0, 0.0, 0.0, x, y, 0.0]),
        }
    }
}

/// Raster profile - everything the IFD tells us without touching pixels.
#[derive(Debug, Clone)]
pub struct RasterProfile {
    /// Image dimensions
    pub width: usize,
    pub height: usize,

    /// Tile dimensions (strip height and image width for stripped TIFFs)
    pub tile_width: usize,
    pub tile_height: usize,

    /// Number of bands/samples per pixel
    pub bands: usize,

    pub sample_type: SampleType,
    pub compression: Compression,

    /// Predictor (1=none, 2=horizontal differencing, 3=floating point)
    pub predictor: u16,

    /// Byte order
    pub little_endian: bool,

    /// Tile byte offsets in the file
    pub tile_offsets: Vec<u64>,

    /// Tile byte counts (compressed sizes)
    pub tile_byte_counts: Vec<u64>,

    pub tiles_across: usize,
    pub tiles_down: usize,

    /// Tiled TIFF (COG layout) vs stripped TIFF
    pub is_tiled: bool,

    /// Geographic transform
    pub geo_transform: GeoTransform,

    /// Detected CRS (EPSG code)
    pub crs_code: Option<i32>,

    /// `NoData` value
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Total pixel count of the full raster.
    #[must_use]
    pub fn pixel_area(&self) -> usize {
        self.width * self.height
    }

    /// Tile index for a pixel coordinate.
    #[must_use]
    pub fn tile_index_for_pixel(&self, px: usize, py: usize) -> Option<usize> {
        if px >= self.width || py >= self.height {
            return None;
        }
        let tile_col = px / self.tile_width;
        let tile_row = py / self.tile_height;
        Some(tile_row * self.tiles_across + tile_col)
    }

    /// Pixel range covered by a tile, clamped to the image edge.
    #[must_use]
    pub fn pixel_range_in_tile(&self, tile_index: usize) -> (usize, usize, usize, usize) {
        let tile_col = tile_index % self.tiles_across;
        let tile_row = tile_index / self.tiles_across;

        let start_x = tile_col * self.tile_width;
        let start_y = tile_row * self.tile_height;
        let end_x = (start_x + self.tile_width).min(self.width);
        let end_y = (start_y + self.tile_height).min(self.height);

        (start_x, start_y, end_x, end_y)
    }
}

/// COG reader - profile metadata plus on-demand tile decode.
pub struct CogReader {
    reader: Arc<dyn RangeReader>,
    pub profile: RasterProfile,
}

impl CogReader {
    /// Open a COG from a URL or local path.
    pub fn open(source: &str) -> Result<Self> {
        let reader = create_range_reader(source)?;
        Self::from_reader(reader)
    }

    /// Open from an existing range reader.
    pub fn from_reader(reader: Arc<dyn RangeReader>) -> Result<Self> {
        let header_bytes = reader.read_range(0, 8)?;

        let little_endian = match &header_bytes[0..2] {
            b"II" => true,
            b"MM" => false,
            _ => return Err(Error::Tiff("invalid TIFF signature".into())),
        };

        let version = read_u16(&header_bytes[2..4], little_endian);
        if version != 42 {
            return Err(Error::Tiff(format!("invalid TIFF version: {version}")));
        }

        let ifd_offset = u64::from(read_u32(&header_bytes[4..8], little_endian));
        let file_size = reader.size();

        // IFD entries fit comfortably in 4KB for real COGs; clamp to the
        // known file size when the source reported one.
        let ifd_size_estimate = if file_size > ifd_offset {
            4096.min((file_size - ifd_offset) as usize)
        } else {
            4096
        };
        let ifd_bytes = reader.read_range(ifd_offset, ifd_size_estimate)?;

        let profile = parse_ifd(&ifd_bytes, &reader, little_endian)?;

        Ok(Self { reader, profile })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        self.reader.identifier()
    }

    #[must_use]
    pub fn reader(&self) -> &Arc<dyn RangeReader> {
        &self.reader
    }

    /// Read and decode a single tile to f32 samples.
    pub fn read_tile(&self, tile_index: usize) -> Result<Vec<f32>> {
        if tile_index >= self.profile.tile_offsets.len() {
            return Err(Error::Tiff(format!(
                "tile index {} out of range (max {})",
                tile_index,
                self.profile.tile_offsets.len()
            )));
        }

        let offset = self.profile.tile_offsets[tile_index];
        let byte_count = self.profile.tile_byte_counts[tile_index] as usize;

        if byte_count == 0 {
            // Sparse tile - no data written for it
            let pixel_count =
                self.profile.tile_width * self.profile.tile_height * self.profile.bands;
            return Ok(vec![f32::NAN; pixel_count]);
        }

        let compressed = self.reader.read_range(offset, byte_count)?;
        self.decode_tile(&compressed)
    }

    /// Decode one tile's compressed bytes to f32 samples.
    ///
    /// Split out from [`read_tile`](Self::read_tile) so window reads can
    /// decode tiles sliced from a single spanning range request.
    pub fn decode_tile(&self, compressed: &[u8]) -> Result<Vec<f32>> {
        let decompressed = decompress_tile(
            compressed,
            self.profile.compression,
            self.profile.tile_width,
            self.profile.tile_height,
            self.profile.bands,
            self.profile.sample_type.bytes_per_sample(),
        )?;

        let unpredicted = apply_predictor(
            &decompressed,
            self.profile.predictor,
            self.profile.tile_width,
            self.profile.bands,
            self.profile.sample_type.bytes_per_sample(),
        )?;

        convert_to_f32(
            &unpredicted,
            self.profile.sample_type,
            self.profile.little_endian,
        )
    }
}

// ============================================================================
// Byte-order helpers
// ============================================================================

#[inline]
pub(crate) fn read_u16(bytes: &[u8], little_endian: bool) -> u16 {
    if little_endian {
        u16::from_le_bytes([bytes[0], bytes[1]])
    } else {
        u16::from_be_bytes([bytes[0], bytes[1]])
    }
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], little_endian: bool) -> u32 {
    if little_endian {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    } else {
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[inline]
fn read_u64(bytes: &[u8], little_endian: bool) -> u64 {
    if little_endian {
        u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    } else {
        u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    }
}

#[inline]
fn read_f64(bytes: &[u8], little_endian: bool) -> f64 {
    if little_endian {
        f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    } else {
        f64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    }
}

// ============================================================================
// IFD parsing
// ============================================================================

struct IfdEntry {
    field_type: u16,
    count: u32,
    value_offset: u32,
    raw_bytes: [u8; 4],
}

/// Parse the first IFD and extract the raster profile.
fn parse_ifd(
    ifd_bytes: &[u8],
    reader: &Arc<dyn RangeReader>,
    little_endian: bool,
) -> Result<RasterProfile> {
    if ifd_bytes.len() < 2 {
        return Err(Error::Tiff("truncated IFD".into()));
    }
    let entry_count = read_u16(&ifd_bytes[0..2], little_endian) as usize;

    let mut tags: HashMap<u16, IfdEntry> = HashMap::new();

    for i in 0..entry_count {
        let offset = 2 + i * 12;
        if offset + 12 > ifd_bytes.len() {
            break;
        }

        let tag = read_u16(&ifd_bytes[offset..offset + 2], little_endian);
        let field_type = read_u16(&ifd_bytes[offset + 2..offset + 4], little_endian);
        let count = read_u32(&ifd_bytes[offset + 4..offset + 8], little_endian);
        let value_offset = read_u32(&ifd_bytes[offset + 8..offset + 12], little_endian);

        tags.insert(
            tag,
            IfdEntry {
                field_type,
                count,
                value_offset,
                raw_bytes: [
                    ifd_bytes[offset + 8],
                    ifd_bytes[offset + 9],
                    ifd_bytes[offset + 10],
                    ifd_bytes[offset + 11],
                ],
            },
        );
    }

    let width = get_tag_value(&tags, TAG_IMAGE_WIDTH, little_endian)
        .ok_or_else(|| Error::Tiff("missing ImageWidth tag".into()))? as usize;
    let height = get_tag_value(&tags, TAG_IMAGE_LENGTH, little_endian)
        .ok_or_else(|| Error::Tiff("missing ImageLength tag".into()))? as usize;

    let bits_per_sample =
        get_tag_value(&tags, TAG_BITS_PER_SAMPLE, little_endian).unwrap_or(8) as u16;
    let sample_format = get_tag_value(&tags, TAG_SAMPLE_FORMAT, little_endian).unwrap_or(1) as u16;
    let bands = get_tag_value(&tags, TAG_SAMPLES_PER_PIXEL, little_endian).unwrap_or(1) as usize;
    let compression_val = get_tag_value(&tags, TAG_COMPRESSION, little_endian).unwrap_or(1) as u16;
    let predictor = get_tag_value(&tags, TAG_PREDICTOR, little_endian).unwrap_or(1) as u16;

    let sample_type = SampleType::from_tags(bits_per_sample, sample_format).ok_or_else(|| {
        Error::Tiff(format!(
            "unsupported data type: bits={bits_per_sample}, format={sample_format}"
        ))
    })?;

    let compression = Compression::from_tag(compression_val)
        .ok_or_else(|| Error::Tiff(format!("unsupported compression: {compression_val}")))?;

    let is_tiled = tags.contains_key(&TAG_TILE_OFFSETS);
    let has_strip_tags = tags.contains_key(&TAG_STRIP_OFFSETS);

    // For tiled: use tile dimensions; for stripped: tile_width = image
    // width, tile_height = rows_per_strip
    let (tile_width, tile_height, tiles_across, tiles_down, tile_offsets, tile_byte_counts) =
        if is_tiled {
            let tw =
                get_tag_value(&tags, TAG_TILE_WIDTH, little_endian).unwrap_or(width as u32) as usize;
            let th = get_tag_value(&tags, TAG_TILE_LENGTH, little_endian).unwrap_or(height as u32)
                as usize;
            let ta = width.div_ceil(tw);
            let td = height.div_ceil(th);
            let total_tiles = ta * td;

            let offsets =
                read_tag_array_u64(&tags, TAG_TILE_OFFSETS, reader, little_endian, total_tiles)?;
            let byte_counts =
                read_tag_array_u64(&tags, TAG_TILE_BYTE_COUNTS, reader, little_endian, total_tiles)?;

            (tw, th, ta, td, offsets, byte_counts)
        } else if has_strip_tags {
            let rows_per_strip =
                get_tag_value(&tags, TAG_ROWS_PER_STRIP, little_endian).unwrap_or(height as u32)
                    as usize;
            let td = height.div_ceil(rows_per_strip);

            let offsets = read_tag_array_u64(&tags, TAG_STRIP_OFFSETS, reader, little_endian, td)?;
            let byte_counts =
                read_tag_array_u64(&tags, TAG_STRIP_BYTE_COUNTS, reader, little_endian, td)?;

            (width, rows_per_strip, 1, td, offsets, byte_counts)
        } else {
            return Err(Error::Tiff("TIFF has neither tile nor strip tags".into()));
        };

    let pixel_scale = read_tag_f64_array(&tags, TAG_MODEL_PIXEL_SCALE, reader, little_endian, 3)?;
    let tiepoint = read_tag_f64_array(&tags, TAG_MODEL_TIEPOINT, reader, little_endian, 6)?;

    let geo_transform = GeoTransform {
        pixel_scale: pixel_scale.map(|v| [v[0], v[1], v[2]]),
        tiepoint: tiepoint.map(|v| [v[0], v[1], v[2], v[3], v[4], v[5]]),
    };

    let crs_code = read_crs_from_geokeys(&tags, reader, little_endian)?;
    let nodata = read_gdal_nodata(&tags, reader, little_endian)?;

    Ok(RasterProfile {
        width,
        height,
        tile_width,
        tile_height,
        bands,
        sample_type,
        compression,
        predictor,
        little_endian,
        tile_offsets,
        tile_byte_counts,
        tiles_across,
        tiles_down,
        is_tiled,
        geo_transform,
        crs_code,
        nodata,
    })
}

fn get_tag_value(tags: &HashMap<u16, IfdEntry>, tag: u16, little_endian: bool) -> Option<u32> {
    let entry = tags.get(&tag)?;
    // Inline values only; array-valued tags go through read_tag_array_u64
    if entry.count != 1 {
        return None;
    }
    match entry.field_type {
        1 => Some(u32::from(entry.raw_bytes[0])),
        3 => Some(u32::from(read_u16(&entry.raw_bytes, little_endian))),
        4 => Some(read_u32(&entry.raw_bytes, little_endian)),
        _ => None,
    }
}

fn read_tag_array_u64(
    tags: &HashMap<u16, IfdEntry>,
    tag: u16,
    reader: &Arc<dyn RangeReader>,
    little_endian: bool,
    expected_count: usize,
) -> Result<Vec<u64>> {
    let entry = tags
        .get(&tag)
        .ok_or_else(|| Error::Tiff(format!("missing tag {tag}")))?;

    let type_size = match entry.field_type {
        3 => 2,  // SHORT
        4 => 4,  // LONG
        16 => 8, // LONG8
        _ => {
            return Err(Error::Tiff(format!(
                "unsupported type {} for tag {}",
                entry.field_type, tag
            )))
        }
    };

    let total_bytes = entry.count as usize * type_size;

    let raw_bytes = if total_bytes <= 4 {
        entry.raw_bytes[..total_bytes].to_vec()
    } else {
        reader.read_range(u64::from(entry.value_offset), total_bytes)?
    };

    let mut values = Vec::with_capacity(entry.count as usize);
    for i in 0..entry.count as usize {
        let offset = i * type_size;
        let value = match entry.field_type {
            3 => u64::from(read_u16(&raw_bytes[offset..], little_endian)),
            4 => u64::from(read_u32(&raw_bytes[offset..], little_endian)),
            16 => read_u64(&raw_bytes[offset..], little_endian),
            _ => 0,
        };
        values.push(value);
    }

    // Pad with zeros if we got fewer than expected
    while values.len() < expected_count {
        values.push(0);
    }

    Ok(values)
}

fn read_tag_f64_array(
    tags: &HashMap<u16, IfdEntry>,
    tag: u16,
    reader: &Arc<dyn RangeReader>,
    little_endian: bool,
    min_count: usize,
) -> Result<Option<Vec<f64>>> {
    let Some(entry) = tags.get(&tag) else {
        return Ok(None);
    };

    // DOUBLE
    if entry.field_type != 12 {
        return Ok(None);
    }

    if (entry.count as usize) < min_count {
        return Ok(None);
    }

    let total_bytes = entry.count as usize * 8;
    let raw_bytes = reader.read_range(u64::from(entry.value_offset), total_bytes)?;

    let mut values = Vec::with_capacity(entry.count as usize);
    for i in 0..entry.count as usize {
        let offset = i * 8;
        values.push(read_f64(&raw_bytes[offset..], little_endian));
    }

    Ok(Some(values))
}

fn read_crs_from_geokeys(
    tags: &HashMap<u16, IfdEntry>,
    reader: &Arc<dyn RangeReader>,
    little_endian: bool,
) -> Result<Option<i32>> {
    let Some(entry) = tags.get(&TAG_GEO_KEY_DIRECTORY) else {
        return Ok(None);
    };

    // GeoKey directory is an array of SHORT values
    if entry.field_type != 3 {
        return Ok(None);
    }

    let total_bytes = entry.count as usize * 2;
    let raw_bytes = if total_bytes <= 4 {
        entry.raw_bytes[..total_bytes].to_vec()
    } else {
        reader.read_range(u64::from(entry.value_offset), total_bytes)?
    };

    // Header: KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys
    // then per key: KeyID, TIFFTagLocation, Count, ValueOffset
    if raw_bytes.len() < 8 {
        return Ok(None);
    }

    let num_keys = read_u16(&raw_bytes[6..8], little_endian) as usize;

    for i in 0..num_keys {
        let offset = 8 + i * 8;
        if offset + 8 > raw_bytes.len() {
            break;
        }

        let key_id = read_u16(&raw_bytes[offset..], little_endian);
        let value = read_u16(&raw_bytes[offset + 6..], little_endian);

        if key_id == GEO_KEY_PROJECTED_CRS && value > 0 {
            return Ok(Some(i32::from(value)));
        }
        if key_id == GEO_KEY_GEOGRAPHIC_TYPE && value > 0 {
            return Ok(Some(i32::from(value)));
        }
    }

    Ok(None)
}

fn read_gdal_nodata(
    tags: &HashMap<u16, IfdEntry>,
    reader: &Arc<dyn RangeReader>,
    _little_endian: bool,
) -> Result<Option<f64>> {
    let entry = match tags.get(&TAG_GDAL_NODATA) {
        Some(e) => e,
        None => return Ok(None),
    };

    let total_bytes = entry.count as usize;
    let raw_bytes = if total_bytes <= 4 {
        entry.raw_bytes[..total_bytes].to_vec()
    } else {
        reader.read_range(u64::from(entry.value_offset), total_bytes)?
    };

    let nodata_str = String::from_utf8_lossy(&raw_bytes);
    let nodata_str = nodata_str.trim_end_matches('\0').trim();

    Ok(nodata_str.parse().ok())
}

// ============================================================================
// Decompression and data conversion
// ============================================================================

fn decompress_tile(
    compressed: &[u8],
    compression: Compression,
    tile_width: usize,
    tile_height: usize,
    bands: usize,
    bytes_per_sample: usize,
) -> Result<Vec<u8>> {
    let expected_size = tile_width * tile_height * bands * bytes_per_sample;

    match compression {
        Compression::None => {
            if compressed.len() >= expected_size {
                Ok(compressed[..expected_size].to_vec())
            } else {
                // Pad with zeros
                let mut result = compressed.to_vec();
                result.resize(expected_size, 0);
                Ok(result)
            }
        }
        Compression::Deflate => {
            use std::io::Read;
            let mut decoder = flate2::read::ZlibDecoder::new(compressed);
            let mut decompressed = Vec::with_capacity(expected_size);
            decoder.read_to_end(&mut decompressed)?;
            Ok(decompressed)
        }
        Compression::Lzw => {
            let mut decoder =
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            let decompressed = decoder
                .decode(compressed)
                .map_err(|e| Error::Tiff(format!("LZW decode failed: {e}")))?;
            Ok(decompressed)
        }
        Compression::Zstd => {
            let decompressed = zstd::stream::decode_all(compressed)?;
            Ok(decompressed)
        }
    }
}

/// Reverse TIFF predictor encoding to recover original sample values.
///
/// Predictor 2 differencing operates on whole samples, not bytes: for
/// multi-byte samples the accumulation must happen at sample width so
/// carries propagate between the low and high bytes. Rows never
/// accumulate across boundaries.
fn apply_predictor(
    data: &[u8],
    predictor: u16,
    tile_width: usize,
    bands: usize,
    bytes_per_sample: usize,
) -> Result<Vec<u8>> {
    match predictor {
        1 => Ok(data.to_vec()),

        // Horizontal differencing: original[i] = sample[i] + original[i-1]
        2 => {
            let mut result = data.to_vec();
            let row_bytes = tile_width * bands * bytes_per_sample;
            let samples_per_row = tile_width * bands;

            for row in result.chunks_mut(row_bytes) {
                match bytes_per_sample {
                    1 => {
                        for i in 1..row.len() {
                            row[i] = row[i].wrapping_add(row[i - 1]);
                        }
                    }
                    2 => {
                        for i in 1..samples_per_row {
                            let prev_offset = (i - 1) * 2;
                            let curr_offset = i * 2;
                            if curr_offset + 2 > row.len() {
                                break;
                            }
                            let prev =
                                u16::from_le_bytes([row[prev_offset], row[prev_offset + 1]]);
                            let curr =
                                u16::from_le_bytes([row[curr_offset], row[curr_offset + 1]]);
                            let sum = curr.wrapping_add(prev);
                            row[curr_offset..curr_offset + 2].copy_from_slice(&sum.to_le_bytes());
                        }
                    }
                    4 => {
                        for i in 1..samples_per_row {
                            let prev_offset = (i - 1) * 4;
                            let curr_offset = i * 4;
                            if curr_offset + 4 > row.len() {
                                break;
                            }
                            let prev = u32::from_le_bytes([
                                row[prev_offset],
                                row[prev_offset + 1],
                                row[prev_offset + 2],
                                row[prev_offset + 3],
                            ]);
                            let curr = u32::from_le_bytes([
                                row[curr_offset],
                                row[curr_offset + 1],
                                row[curr_offset + 2],
                                row[curr_offset + 3],
                            ]);
                            let sum = curr.wrapping_add(prev);
                            row[curr_offset..curr_offset + 4].copy_from_slice(&sum.to_le_bytes());
                        }
                    }
                    _ => {
                        // Uncommon sample sizes: byte-level accumulation
                        // with stride
                        for i in bytes_per_sample..row.len() {
                            row[i] = row[i].wrapping_add(row[i - bytes_per_sample]);
                        }
                    }
                }
            }

            Ok(result)
        }

        // Floating-point predictor: bytes at the same position within
        // each sample are differenced together
        3 => {
            let mut result = data.to_vec();
            let row_bytes = tile_width * bands * bytes_per_sample;

            for row in result.chunks_mut(row_bytes) {
                for byte_pos in 0..bytes_per_sample {
                    for i in 1..(row.len() / bytes_per_sample) {
                        let idx = i * bytes_per_sample + byte_pos;
                        let prev_idx = (i - 1) * bytes_per_sample + byte_pos;
                        row[idx] = row[idx].wrapping_add(row[prev_idx]);
                    }
                }
            }

            Ok(result)
        }

        _ => Err(Error::Tiff(format!("unsupported predictor: {predictor}"))),
    }
}

fn convert_to_f32(data: &[u8], sample_type: SampleType, little_endian: bool) -> Result<Vec<f32>> {
    let bytes_per_sample = sample_type.bytes_per_sample();
    let sample_count = data.len() / bytes_per_sample;
    let mut result = Vec::with_capacity(sample_count);

    for i in 0..sample_count {
        let offset = i * bytes_per_sample;
        let bytes = &data[offset..offset + bytes_per_sample];

        let value = match sample_type {
            SampleType::UInt8 => f32::from(bytes[0]),
            SampleType::Int8 => f32::from(bytes[0] as i8),
            SampleType::UInt16 => {
                if little_endian {
                    f32::from(u16::from_le_bytes([bytes[0], bytes[1]]))
                } else {
                    f32::from(u16::from_be_bytes([bytes[0], bytes[1]]))
                }
            }
            SampleType::Int16 => {
                if little_endian {
                    f32::from(i16::from_le_bytes([bytes[0], bytes[1]]))
                } else {
                    f32::from(i16::from_be_bytes([bytes[0], bytes[1]]))
                }
            }
            SampleType::UInt32 => {
                if little_endian {
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                } else {
                    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                }
            }
            SampleType::Int32 => {
                if little_endian {
                    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                } else {
                    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                }
            }
            SampleType::Float32 => {
                if little_endian {
                    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                } else {
                    f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                }
            }
            SampleType::Float64 => {
                if little_endian {
                    f64::from_le_bytes([
                        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                        bytes[7],
                    ]) as f32
                } else {
                    f64::from_be_bytes([
                        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                        bytes[7],
                    ]) as f32
                }
            }
        };

        result.push(value);
    }

    Ok(result)
}
