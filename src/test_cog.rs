//! Test fixture: build a small tiled GeoTIFF in memory.
//!
//! Produces the little-endian, uncompressed, single-band u16 layout that
//! Sentinel-2 band assets use, so profile parsing, tile reads and window
//! extraction can be exercised without any network or disk I/O.

/// Description of an in-memory test COG.
pub struct TestCog {
    pub width: usize,
    pub height: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    /// Pixel scale in CRS units per pixel.
    pub pixel_scale: [f64; 3],
    /// Raster tiepoint: pixel (0,0) maps to world (x, y).
    pub tiepoint: [f64; 6],
    pub epsg: u16,
}

impl TestCog {
    /// A raster with a deterministic per-pixel gradient, georeferenced to
    /// a UTM 31N grid at 10 m resolution.
    #[must_use]
    pub fn gradient(width: usize, height: usize, tile_width: usize, tile_height: usize) -> Self {
        Self {
            width,
            height,
            tile_width,
            tile_height,
            pixel_scale: [10.0, 10.0, 0.0],
            tiepoint: [0.0, 0.0, 0.0, 600000.0, 5400000.0, 0.0],
            epsg: 32631,
        }
    }

    /// Deterministic pixel value used to verify reads.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u16 {
        ((x * 100 + y) % 60000) as u16
    }

    fn tiles_across(&self) -> usize {
        self.width.div_ceil(self.tile_width)
    }

    fn tiles_down(&self) -> usize {
        self.height.div_ceil(self.tile_height)
    }
}

fn push_entry(ifd: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    ifd.extend_from_slice(&tag.to_le_bytes());
    ifd.extend_from_slice(&field_type.to_le_bytes());
    ifd.extend_from_slice(&count.to_le_bytes());
    ifd.extend_from_slice(&value.to_le_bytes());
}

/// Serialize a [`TestCog`] to valid TIFF bytes.
#[must_use]
pub fn cog_bytes(cog: &TestCog) -> Vec<u8> {
    let tiles_across = cog.tiles_across();
    let tiles_down = cog.tiles_down();
    let tile_count = tiles_across * tiles_down;
    let tile_bytes = cog.tile_width * cog.tile_height * 2;

    const ENTRY_COUNT: usize = 14;
    let ifd_offset = 8usize;
    let ifd_len = 2 + ENTRY_COUNT * 12 + 4;
    let extras_offset = ifd_offset + ifd_len;

    // Lay out the out-of-line value area
    let offsets_arr_len = if tile_count > 1 { tile_count * 4 } else { 0 };
    let counts_arr_len = offsets_arr_len;
    let scale_offset = extras_offset + offsets_arr_len + counts_arr_len;
    let tiepoint_offset = scale_offset + 24;
    let geokeys_offset = tiepoint_offset + 48;
    let data_offset = geokeys_offset + 16;

    let tile_offset = |index: usize| (data_offset + index * tile_bytes) as u32;

    let mut ifd = Vec::with_capacity(ifd_len);
    ifd.extend_from_slice(&(ENTRY_COUNT as u16).to_le_bytes());
    push_entry(&mut ifd, 256, 4, 1, cog.width as u32); // ImageWidth
    push_entry(&mut ifd, 257, 4, 1, cog.height as u32); // ImageLength
    push_entry(&mut ifd, 258, 3, 1, 16); // BitsPerSample
    push_entry(&mut ifd, 259, 3, 1, 1); // Compression: none
    push_entry(&mut ifd, 262, 3, 1, 1); // Photometric: BlackIsZero
    push_entry(&mut ifd, 277, 3, 1, 1); // SamplesPerPixel
    push_entry(&mut ifd, 322, 3, 1, cog.tile_width as u32); // TileWidth
    push_entry(&mut ifd, 323, 3, 1, cog.tile_height as u32); // TileLength
    if tile_count > 1 {
        push_entry(&mut ifd, 324, 4, tile_count as u32, extras_offset as u32);
        push_entry(
            &mut ifd,
            325,
            4,
            tile_count as u32,
            (extras_offset + offsets_arr_len) as u32,
        );
    } else {
        push_entry(&mut ifd, 324, 4, 1, tile_offset(0));
        push_entry(&mut ifd, 325, 4, 1, tile_bytes as u32);
    }
    push_entry(&mut ifd, 339, 3, 1, 1); // SampleFormat: unsigned
    push_entry(&mut ifd, 33550, 12, 3, scale_offset as u32); // ModelPixelScale
    push_entry(&mut ifd, 33922, 12, 6, tiepoint_offset as u32); // ModelTiepoint
    push_entry(&mut ifd, 34735, 3, 8, geokeys_offset as u32); // GeoKeyDirectory
    ifd.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

    let mut out = Vec::with_capacity(data_offset + tile_count * tile_bytes);
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(ifd_offset as u32).to_le_bytes());
    out.extend_from_slice(&ifd);

    if tile_count > 1 {
        for i in 0..tile_count {
            out.extend_from_slice(&tile_offset(i).to_le_bytes());
        }
        for _ in 0..tile_count {
            out.extend_from_slice(&(tile_bytes as u32).to_le_bytes());
        }
    }

    for value in cog.pixel_scale {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for value in cog.tiepoint {
        out.extend_from_slice(&value.to_le_bytes());
    }

    // GeoKey directory: version 1.1.0, one key (ProjectedCSType)
    for value in [1u16, 1, 0, 1, 3072, 0, 1, cog.epsg] {
        out.extend_from_slice(&value.to_le_bytes());
    }

    debug_assert_eq!(out.len(), data_offset);

    // Tile data: full tiles, pixels past the image edge are zero
    for tile_row in 0..tiles_down {
        for tile_col in 0..tiles_across {
            for local_y in 0..cog.tile_height {
                for local_x in 0..cog.tile_width {
                    let x = tile_col * cog.tile_width + local_x;
                    let y = tile_row * cog.tile_height + local_y;
                    let value = if x < cog.width && y < cog.height {
                        cog.pixel(x, y)
                    } else {
                        0
                    };
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
    }

    out
}
