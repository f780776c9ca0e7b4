pub mod projection;

use crate::error::Result;

/// Kilometers per degree of latitude (and of longitude at the equator).
const KM_PER_DEGREE: f64 = 111.32;

/// A simple 2D point with x and y coordinates.
///
/// Represents geographic coordinates (longitude as x, latitude as y) or
/// projected coordinates, depending on context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// X coordinate (longitude for geographic points)
    pub x: f64,
    /// Y coordinate (latitude for geographic points)
    pub y: f64,
}

impl Point {
    /// Create a new point from x and y coordinates.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Create a point from longitude and latitude (EPSG:4326).
    #[inline]
    #[must_use]
    pub fn lonlat(lon: f64, lat: f64) -> Self {
        Self { x: lon, y: lat }
    }

    /// Get longitude (alias for x).
    #[inline]
    #[must_use]
    pub fn lon(&self) -> f64 {
        self.x
    }

    /// Get latitude (alias for y).
    #[inline]
    #[must_use]
    pub fn lat(&self) -> f64 {
        self.y
    }
}

impl From<(f64, f64)> for Point {
    #[inline]
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned bounding box in some coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    #[must_use]
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self { minx, miny, maxx, maxy }
    }

    /// Build a box centered on a geographic point, extending `delta_km`
    /// kilometers in each cardinal direction.
    ///
    /// The km-to-degree conversion uses the 111.32 km/degree rule with
    /// the longitude span scaled by cos(latitude), so the box is roughly
    /// square on the ground rather than in degrees.
    #[must_use]
    pub fn around(center: Point, delta_km: f64) -> Self {
        let (delta_lon, delta_lat) = delta_km_to_deg(center.lat(), delta_km, delta_km);
        Self {
            minx: center.lon() - delta_lon,
            miny: center.lat() - delta_lat,
            maxx: center.lon() + delta_lon,
            maxy: center.lat() + delta_lat,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// Reproject corner-wise into another CRS.
    ///
    /// Corner-wise reprojection holds up for the transforms this tool
    /// deals with: WGS84 to a UTM zone over a span of a few kilometers.
    pub fn project(&self, source_epsg: i32, target_epsg: i32) -> Result<Self> {
        let (ax, ay) = projection::project_point(source_epsg, target_epsg, self.minx, self.miny)?;
        let (bx, by) = projection::project_point(source_epsg, target_epsg, self.maxx, self.maxy)?;
        Ok(Self {
            minx: ax.min(bx),
            miny: ay.min(by),
            maxx: ax.max(bx),
            maxy: ay.max(by),
        })
    }

    /// GeoJSON polygon (closed ring) for STAC `intersects` queries.
    #[must_use]
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[
                [self.minx, self.miny],
                [self.maxx, self.miny],
                [self.maxx, self.maxy],
                [self.minx, self.maxy],
                [self.minx, self.miny],
            ]]
        })
    }
}

/// Convert a kilometer delta at a given latitude to (longitude, latitude)
/// degree deltas.
#[must_use]
pub fn delta_km_to_deg(lat: f64, delta_x_km: f64, delta_y_km: f64) -> (f64, f64) {
    let delta_lat_deg = delta_y_km / KM_PER_DEGREE;
    let delta_lon_deg = delta_x_km / (KM_PER_DEGREE * lat.to_radians().cos());
    (delta_lon_deg, delta_lat_deg)
}
