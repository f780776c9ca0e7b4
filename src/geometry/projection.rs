//! Coordinate transformations between EPSG codes, pure Rust via proj4rs.

use crate::error::{Error, Result};

/// Project a point from one CRS to another using proj4rs + crs-definitions.
///
/// Handles transformations between any EPSG codes present in the
/// crs-definitions database, which covers the UTM zones Sentinel-2 scenes
/// are delivered in.
///
/// # Arguments
/// * `source_epsg` - Source CRS EPSG code
/// * `target_epsg` - Target CRS EPSG code
/// * `x` - X coordinate in source CRS
/// * `y` - Y coordinate in source CRS
///
/// # Returns
/// Tuple of (x, y) in the target CRS, or an error if an EPSG code is not
/// supported.
#[inline]
pub fn project_point(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
    // No-op if same CRS
    if source_epsg == target_epsg {
        return Ok((x, y));
    }

    project_with_proj4rs(source_epsg, target_epsg, x, y)
}

/// Get the PROJ4 string for an EPSG code from the crs-definitions database.
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS.
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    // The proj string is authoritative; the 4000-range check is only a
    // fallback for codes outside the database.
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        epsg == 4326 || (epsg >= 4000 && epsg < 5000)
    }
}

fn project_with_proj4rs(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64)> {
    use proj4rs::proj::Proj;
    use proj4rs::transform::transform;

    let source_str = get_proj_string(source_epsg).ok_or_else(|| {
        Error::Projection(format!("EPSG:{source_epsg} is not in the crs-definitions database"))
    })?;
    let target_str = get_proj_string(target_epsg).ok_or_else(|| {
        Error::Projection(format!("EPSG:{target_epsg} is not in the crs-definitions database"))
    })?;

    let source_proj = Proj::from_proj_string(source_str).map_err(|e| {
        Error::Projection(format!("invalid source projection EPSG:{source_epsg}: {e:?}"))
    })?;
    let target_proj = Proj::from_proj_string(target_str).map_err(|e| {
        Error::Projection(format!("invalid target projection EPSG:{target_epsg}: {e:?}"))
    })?;

    // proj4rs uses radians for geographic coordinates
    let (x_in, y_in) = if is_geographic_crs(source_epsg) {
        (x.to_radians(), y.to_radians())
    } else {
        (x, y)
    };

    let mut point = (x_in, y_in, 0.0);
    transform(&source_proj, &target_proj, &mut point).map_err(|e| {
        Error::Projection(format!(
            "transform from EPSG:{source_epsg} to EPSG:{target_epsg} failed: {e:?}"
        ))
    })?;

    let (out_x, out_y) = if is_geographic_crs(target_epsg) {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };

    Ok((out_x, out_y))
}
