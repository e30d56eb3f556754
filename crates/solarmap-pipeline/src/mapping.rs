//! Pixel to geographic coordinate mapping.
//!
//! [`Projection`] builds a per-tile [`CoordinateMapper`]; extraction and
//! aggregation only ever talk to the mapper, so a geodesic or projected
//! transform can replace [`FlatEarth`] without touching them.
//!
//! # Flat-earth model
//!
//! Around the tile center the ground is treated as a plane:
//!
//! ```text
//! dx = x - w/2                dy = y - h/2
//! dlat = -dy * mpp * dpm      dlon = dx * mpp * dpm / cos(lat_c)
//! ```
//!
//! Rows grow downward in the image, so increasing `y` moves south. The
//! `cos(lat_c)` term corrects for meridian convergence and diverges at the
//! poles, which [`FlatEarth::mapper`] refuses.

use geo::{Coord, LineString, Polygon};

use crate::types::{Dimensions, GeoCenter, PanelBox, PipelineConfig, PipelineError, Point};

/// Converts between tile pixel coordinates and `(lon, lat)` degrees.
pub trait CoordinateMapper {
    /// Map a pixel coordinate to `(x = lon, y = lat)`.
    fn to_geo(&self, pixel: Point) -> Coord<f64>;

    /// Inverse of [`to_geo`](Self::to_geo).
    fn to_pixel(&self, coord: Coord<f64>) -> Point;

    /// Map an open ring of pixel coordinates to a closed geographic polygon.
    ///
    /// Every vertex is mapped independently, so the vertex count is
    /// preserved.
    fn map_ring(&self, ring: &[Point]) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = ring.iter().map(|&p| self.to_geo(p)).collect();
        Polygon::new(LineString::from(coords), vec![])
    }

    /// Map a panel box to a geographic quadrilateral.
    fn map_box(&self, panel: &PanelBox) -> Polygon<f64> {
        self.map_ring(&panel.corners())
    }
}

/// Builds a [`CoordinateMapper`] for one tile.
pub trait Projection: Sync {
    /// The per-tile mapper type.
    type Mapper: CoordinateMapper;

    /// Create the mapper for a tile with the given center and size.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTileCenter`] when the center cannot
    /// be mapped by this projection.
    fn mapper(&self, center: GeoCenter, dimensions: Dimensions)
    -> Result<Self::Mapper, PipelineError>;
}

/// Local planar approximation parameterised by ground sampling distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatEarth {
    /// Meters covered by one pixel.
    pub meters_per_pixel: f64,
    /// Degrees of latitude per meter.
    pub degrees_per_meter: f64,
}

impl FlatEarth {
    /// Take the ground sampling parameters from a pipeline config.
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            meters_per_pixel: config.meters_per_pixel,
            degrees_per_meter: config.degrees_per_meter,
        }
    }
}

impl Default for FlatEarth {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Projection for FlatEarth {
    type Mapper = FlatEarthMapper;

    fn mapper(
        &self,
        center: GeoCenter,
        dimensions: Dimensions,
    ) -> Result<FlatEarthMapper, PipelineError> {
        let cos_lat = center.lat.to_radians().cos();
        if !center.lat.is_finite()
            || !center.lon.is_finite()
            || center.lat.abs() >= 90.0
            || cos_lat <= f64::EPSILON
        {
            return Err(PipelineError::InvalidTileCenter {
                lat: center.lat,
                lon: center.lon,
            });
        }

        let deg_per_px = self.meters_per_pixel * self.degrees_per_meter;
        Ok(FlatEarthMapper {
            center,
            half_width: f64::from(dimensions.width) / 2.0,
            half_height: f64::from(dimensions.height) / 2.0,
            lat_per_px: deg_per_px,
            lon_per_px: deg_per_px / cos_lat,
        })
    }
}

/// [`FlatEarth`] mapper bound to one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatEarthMapper {
    center: GeoCenter,
    half_width: f64,
    half_height: f64,
    lat_per_px: f64,
    lon_per_px: f64,
}

impl CoordinateMapper for FlatEarthMapper {
    fn to_geo(&self, pixel: Point) -> Coord<f64> {
        let dx = pixel.x - self.half_width;
        let dy = pixel.y - self.half_height;
        Coord {
            x: dx.mul_add(self.lon_per_px, self.center.lon),
            y: (-dy).mul_add(self.lat_per_px, self.center.lat),
        }
    }

    fn to_pixel(&self, coord: Coord<f64>) -> Point {
        let dx = (coord.x - self.center.lon) / self.lon_per_px;
        let dy = -(coord.y - self.center.lat) / self.lat_per_px;
        Point::new(dx + self.half_width, dy + self.half_height)
    }
}
