//! GeoTIFF persister.
//!
//! Writes one strip-organized, uncompressed, pixel-interleaved GeoTIFF
//! per scene. The emitted IFD mirrors the layout the profile reader
//! parses: georeferencing via `ModelPixelScale`/`ModelTiepoint`, CRS via
//! the `GeoKey` directory, and scene provenance (title, date, cloud
//! cover, platform, bands) in the GDAL metadata XML tag.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use tracing::info;

use crate::cog::{
    SampleType, GEO_KEY_GEOGRAPHIC_TYPE, GEO_KEY_MODEL_TYPE, GEO_KEY_PROJECTED_CRS,
    GEO_KEY_RASTER_TYPE, TAG_BITS_PER_SAMPLE, TAG_COMPRESSION, TAG_GDAL_METADATA, TAG_GDAL_NODATA,
    TAG_GEO_KEY_DIRECTORY, TAG_IMAGE_LENGTH, TAG_IMAGE_WIDTH, TAG_MODEL_PIXEL_SCALE,
    TAG_MODEL_TIEPOINT, TAG_PHOTOMETRIC, TAG_PLANAR_CONFIGURATION, TAG_ROWS_PER_STRIP,
    TAG_SAMPLES_PER_PIXEL, TAG_SAMPLE_FORMAT, TAG_STRIP_BYTE_COUNTS, TAG_STRIP_OFFSETS,
};
use crate::composite::SceneRaster;
use crate::error::{Error, Result};
use crate::geometry::projection::is_geographic_crs;

// TIFF field types
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_DOUBLE: u16 = 12;

/// Sample layout of the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    U8,
    U16,
    F32,
}

impl OutputFormat {
    /// Preserve the source type when `f32` represents it exactly,
    /// otherwise fall back to float samples.
    fn for_source(source: SampleType) -> Self {
        match source {
            SampleType::UInt8 => OutputFormat::U8,
            SampleType::UInt16 => OutputFormat::U16,
            _ => OutputFormat::F32,
        }
    }

    fn bits_per_sample(self) -> u16 {
        match self {
            OutputFormat::U8 => 8,
            OutputFormat::U16 => 16,
            OutputFormat::F32 => 32,
        }
    }

    fn sample_format(self) -> u16 {
        match self {
            OutputFormat::U8 | OutputFormat::U16 => 1,
            OutputFormat::F32 => 3,
        }
    }
}

/// Write one scene raster into `out_dir`, returning the file path.
///
/// The file name encodes scene id, acquisition date, cloud cover and the
/// band list; everything else lives in the embedded metadata.
pub fn save_scene(raster: &SceneRaster, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(file_name(raster));
    let bytes = encode_geotiff(raster)?;
    fs::write(&path, bytes)?;
    info!(path = %path.display(), "saved scene");
    Ok(path)
}

fn file_name(raster: &SceneRaster) -> String {
    let meta = &raster.meta;
    let date_part = DateTime::parse_from_rfc3339(&meta.datetime)
        .map(|dt| dt.format("%Y_%m_%d").to_string())
        .unwrap_or_else(|_| "unknown_date".to_string());
    let band_names: Vec<&str> = meta.bands.iter().map(|b| b.name()).collect();
    format!(
        "{}_{}_cc{:02}_{}.tif",
        meta.scene_id,
        date_part,
        meta.cloud_cover.round() as u32,
        band_names.join("-")
    )
}

/// One IFD entry plus its value payload (little-endian bytes).
struct TagEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    payload: Vec<u8>,
}

fn short_entry(tag: u16, values: &[u16]) -> TagEntry {
    let mut payload = Vec::with_capacity(values.len() * 2);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    TagEntry {
        tag,
        field_type: TYPE_SHORT,
        count: values.len() as u32,
        payload,
    }
}

fn long_entry(tag: u16, values: &[u32]) -> TagEntry {
    let mut payload = Vec::with_capacity(values.len() * 4);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    TagEntry {
        tag,
        field_type: TYPE_LONG,
        count: values.len() as u32,
        payload,
    }
}

fn double_entry(tag: u16, values: &[f64]) -> TagEntry {
    let mut payload = Vec::with_capacity(values.len() * 8);
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    TagEntry {
        tag,
        field_type: TYPE_DOUBLE,
        count: values.len() as u32,
        payload,
    }
}

fn ascii_entry(tag: u16, text: &str) -> TagEntry {
    let mut payload = text.as_bytes().to_vec();
    payload.push(0); // ASCII values are NUL-terminated
    TagEntry {
        tag,
        field_type: TYPE_ASCII,
        count: payload.len() as u32,
        payload,
    }
}

/// GDAL metadata XML in the shape rasterio/GDAL write and the profile
/// reader parses: `<Item name="Key">value</Item>` lines.
fn gdal_metadata_xml(raster: &SceneRaster) -> String {
    let meta = &raster.meta;
    let mut xml = String::from("<GDALMetadata>\n");
    xml.push_str("  <Item name=\"Title\">Sentinel-2 L2A composite</Item>\n");
    xml.push_str(&format!("  <Item name=\"Date\">{}</Item>\n", meta.datetime));
    xml.push_str(&format!(
        "  <Item name=\"CloudCover\">{}</Item>\n",
        meta.cloud_cover
    ));
    if let Some(platform) = &meta.platform {
        xml.push_str(&format!("  <Item name=\"Platform\">{platform}</Item>\n"));
    }
    xml.push_str(&format!(
        "  <Item name=\"Bands\">{}</Item>\n",
        meta.band_list()
    ));
    xml.push_str("</GDALMetadata>");
    xml
}

fn geo_key_directory(crs_code: i32) -> Option<Vec<u16>> {
    let code = u16::try_from(crs_code).ok()?;
    let geographic = is_geographic_crs(crs_code);
    let model_type = if geographic { 2 } else { 1 };
    let crs_key = if geographic {
        GEO_KEY_GEOGRAPHIC_TYPE
    } else {
        GEO_KEY_PROJECTED_CRS
    };
    Some(vec![
        // KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys
        1,
        1,
        0,
        3,
        GEO_KEY_MODEL_TYPE,
        0,
        1,
        model_type,
        GEO_KEY_RASTER_TYPE,
        0,
        1,
        1, // PixelIsArea
        crs_key,
        0,
        1,
        code,
    ])
}

fn encode_samples(raster: &SceneRaster, format: OutputFormat) -> Vec<u8> {
    let (bands, height, width) = raster.data.dim();
    let bytes_per = usize::from(format.bits_per_sample() / 8);
    // NaN (sparse tiles) becomes the nodata value on the way out
    let fill = raster.meta.nodata.unwrap_or(0.0) as f32;

    let mut out = Vec::with_capacity(width * height * bands * bytes_per);
    for row in 0..height {
        for col in 0..width {
            for band in 0..bands {
                let raw = raster.data[[band, row, col]];
                let value = if raw.is_nan() { fill } else { raw };
                match format {
                    OutputFormat::U8 => out.push(value.clamp(0.0, 255.0) as u8),
                    OutputFormat::U16 => {
                        let v = value.clamp(0.0, 65535.0) as u16;
                        out.extend_from_slice(&v.to_le_bytes());
                    }
                    OutputFormat::F32 => {
                        let v = if raw.is_nan() && raster.meta.nodata.is_none() {
                            raw // keep NaN when there is no nodata to map to
                        } else {
                            value
                        };
                        out.extend_from_slice(&v.to_le_bytes());
                    }
                }
            }
        }
    }
    out
}

/// Serialize the raster as little-endian TIFF bytes.
pub fn encode_geotiff(raster: &SceneRaster) -> Result<Vec<u8>> {
    let (bands, height, width) = raster.data.dim();
    if bands == 0 || width == 0 || height == 0 {
        return Err(Error::Tiff("refusing to write an empty raster".into()));
    }

    let format = OutputFormat::for_source(raster.meta.sample_type);
    let strip = encode_samples(raster, format);

    // Multi-band composites of exactly three bands are conventionally
    // RGB; everything else is BlackIsZero.
    let photometric: u16 = if bands == 3 { 2 } else { 1 };

    let mut entries: Vec<TagEntry> = Vec::new();
    entries.push(long_entry(TAG_IMAGE_WIDTH, &[width as u32]));
    entries.push(long_entry(TAG_IMAGE_LENGTH, &[height as u32]));
    entries.push(short_entry(
        TAG_BITS_PER_SAMPLE,
        &vec![format.bits_per_sample(); bands],
    ));
    entries.push(short_entry(TAG_COMPRESSION, &[1]));
    entries.push(short_entry(TAG_PHOTOMETRIC, &[photometric]));
    // Single strip; its offset is patched in below once the layout is known
    entries.push(long_entry(TAG_STRIP_OFFSETS, &[0]));
    entries.push(short_entry(TAG_SAMPLES_PER_PIXEL, &[bands as u16]));
    entries.push(long_entry(TAG_ROWS_PER_STRIP, &[height as u32]));
    entries.push(long_entry(TAG_STRIP_BYTE_COUNTS, &[strip.len() as u32]));
    entries.push(short_entry(TAG_PLANAR_CONFIGURATION, &[1]));
    entries.push(short_entry(
        TAG_SAMPLE_FORMAT,
        &vec![format.sample_format(); bands],
    ));

    if let Some(scale) = raster.meta.transform.pixel_scale {
        entries.push(double_entry(TAG_MODEL_PIXEL_SCALE, &scale));
    }
    if let Some(tiepoint) = raster.meta.transform.tiepoint {
        entries.push(double_entry(TAG_MODEL_TIEPOINT, &tiepoint));
    }
    if let Some(keys) = raster.meta.crs_code.and_then(geo_key_directory) {
        entries.push(short_entry(TAG_GEO_KEY_DIRECTORY, &keys));
    }
    entries.push(ascii_entry(TAG_GDAL_METADATA, &gdal_metadata_xml(raster)));
    if let Some(nodata) = raster.meta.nodata {
        entries.push(ascii_entry(TAG_GDAL_NODATA, &nodata.to_string()));
    }

    // Layout: header, IFD, out-of-line values, strip data
    let ifd_offset = 8usize;
    let ifd_len = 2 + entries.len() * 12 + 4;
    let extras_offset = ifd_offset + ifd_len;

    let mut extras_len = 0usize;
    for entry in &entries {
        if entry.payload.len() > 4 {
            extras_len += entry.payload.len() + entry.payload.len() % 2;
        }
    }
    let data_offset = extras_offset + extras_len + (extras_offset + extras_len) % 2;

    // Patch the strip offset now that it is known
    for entry in &mut entries {
        if entry.tag == TAG_STRIP_OFFSETS {
            entry.payload = (data_offset as u32).to_le_bytes().to_vec();
        }
    }

    let mut out = Vec::with_capacity(data_offset + strip.len());
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());

    // IFD entries, ascending by tag as TIFF requires
    debug_assert!(entries.windows(2).all(|pair| pair[0].tag < pair[1].tag));
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    let mut next_value_offset = extras_offset;
    let mut extras: Vec<u8> = Vec::with_capacity(extras_len);
    for entry in &entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.field_type.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.payload.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..entry.payload.len()].copy_from_slice(&entry.payload);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(next_value_offset as u32).to_le_bytes());
            extras.extend_from_slice(&entry.payload);
            next_value_offset += entry.payload.len();
            if entry.payload.len() % 2 == 1 {
                extras.push(0);
                next_value_offset += 1;
            }
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

    out.extend_from_slice(&extras);
    while out.len() < data_offset {
        out.push(0);
    }
    out.extend_from_slice(&strip);

    Ok(out)
}
