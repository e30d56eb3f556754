//! Shared types for the solarmap detection pipeline.

use geo::{Area, Coord, LineString, Polygon, Validation};
use serde::{Deserialize, Serialize};

use crate::contour::ContourTracerKind;
use crate::detect::DetectError;

/// Re-export `GrayImage` so downstream crates can hand masks to the
/// pipeline without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can build [`Tile`]s
/// without depending on `image` directly.
pub use image::RgbImage;

/// A 2D point in tile pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge, rows grow downward).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Geographic center of a tile in WGS84-equivalent degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCenter {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
}

impl GeoCenter {
    /// Create a new center from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One satellite tile: the unit of detection.
///
/// Produced by the acquisition collaborator and never mutated by the
/// pipeline. The tile identifier doubles as the `image`/`belongs_to`
/// property of the features emitted for it.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Stable identifier, usually the tile's file name.
    pub id: String,
    /// Optional administrative grouping used for coverage aggregation.
    pub ward: Option<String>,
    /// Geographic center of the image.
    pub center: GeoCenter,
    /// Decoded tile raster.
    pub image: RgbImage,
}

impl Tile {
    /// Create a tile without a ward.
    #[must_use]
    pub fn new(id: impl Into<String>, center: GeoCenter, image: RgbImage) -> Self {
        Self {
            id: id.into(),
            ward: None,
            center,
            image,
        }
    }

    /// Attach a ward identifier.
    #[must_use]
    pub fn with_ward(mut self, ward: impl Into<String>) -> Self {
        self.ward = Some(ward.into());
        self
    }

    /// Pixel dimensions of the tile raster.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Why a candidate polygon was dropped.
///
/// Rejections are never errors: the polygon is counted in the run
/// diagnostics and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolygonRejection {
    /// Fewer than three distinct vertices.
    TooFewPoints,
    /// A vertex is NaN or infinite.
    NonFinite,
    /// The ring encloses no area (collinear or doubled-back vertices).
    ZeroArea,
    /// The ring crosses or touches itself.
    SelfIntersecting,
    /// The polygon is valid but smaller than the configured minimum.
    BelowMinimumArea,
}

/// A simple polygon in tile pixel coordinates.
///
/// Stored as an open ring (the closing vertex is implied). Construction
/// through [`PixelPolygon::try_new`] guarantees at least three distinct
/// vertices, positive area, and no self-intersections.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPolygon {
    ring: Vec<Point>,
    area: f64,
}

impl PixelPolygon {
    /// Validate a ring of pixel coordinates.
    ///
    /// Consecutive duplicate vertices and an explicit closing vertex are
    /// removed before validation.
    ///
    /// # Errors
    ///
    /// Returns the [`PolygonRejection`] describing the first failed check.
    pub fn try_new(points: Vec<Point>) -> Result<Self, PolygonRejection> {
        let ring = open_ring(points);
        if ring.len() < 3 {
            return Err(PolygonRejection::TooFewPoints);
        }
        if ring.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(PolygonRejection::NonFinite);
        }

        let polygon = ring_polygon(&ring);
        let area = polygon.unsigned_area();
        if area <= 0.0 {
            return Err(PolygonRejection::ZeroArea);
        }
        if !polygon.is_valid() {
            return Err(PolygonRejection::SelfIntersecting);
        }

        Ok(Self { ring, area })
    }

    /// Vertices of the open ring.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.ring
    }

    /// Number of vertices (closing vertex excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Always `false`: a valid polygon has at least three vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Enclosed area in square pixels.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// Pixel-space `geo` polygon (closed ring).
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        ring_polygon(&self.ring)
    }
}

/// A simple polygon in `(lon, lat)` degrees.
///
/// Produced once per [`PixelPolygon`] or [`PanelBox`] by a
/// [`CoordinateMapper`](crate::mapping::CoordinateMapper) and re-validated,
/// because reprojection in floating point can collapse or fold rings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPolygon {
    polygon: Polygon<f64>,
    area: f64,
}

impl GeoPolygon {
    /// Validate a mapped polygon.
    ///
    /// `min_area` is in square degrees; anything at or below zero is
    /// always rejected regardless of `min_area`.
    ///
    /// # Errors
    ///
    /// Returns the [`PolygonRejection`] describing the first failed check.
    pub fn try_new(polygon: Polygon<f64>, min_area: f64) -> Result<Self, PolygonRejection> {
        // Exterior rings are closed, so three distinct vertices means four coords.
        if polygon.exterior().0.len() < 4 {
            return Err(PolygonRejection::TooFewPoints);
        }
        if polygon
            .exterior()
            .coords()
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(PolygonRejection::NonFinite);
        }

        let area = polygon.unsigned_area();
        if area <= 0.0 {
            return Err(PolygonRejection::ZeroArea);
        }
        if !polygon.is_valid() {
            return Err(PolygonRejection::SelfIntersecting);
        }
        if area < min_area {
            return Err(PolygonRejection::BelowMinimumArea);
        }

        Ok(Self { polygon, area })
    }

    /// The underlying polygon.
    #[must_use]
    pub const fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Consume and return the underlying polygon.
    #[must_use]
    pub fn into_polygon(self) -> Polygon<f64> {
        self.polygon
    }

    /// Area in square degrees.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.area
    }

    /// Number of ring vertices, closing vertex excluded.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.polygon.exterior().0.len().saturating_sub(1)
    }

    /// Exterior ring coordinates as `(lon, lat)`, closing vertex included.
    pub fn exterior_coords(&self) -> impl Iterator<Item = &Coord<f64>> {
        self.polygon.exterior().coords()
    }
}

/// Axis-aligned panel detection box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl PanelBox {
    /// Create a box from two opposite corners, normalising their order.
    #[must_use]
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            confidence,
        }
    }

    /// Corners as an open ring: top-left, top-right, bottom-right, bottom-left.
    #[must_use]
    pub const fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x1, self.y1),
            Point::new(self.x2, self.y1),
            Point::new(self.x2, self.y2),
            Point::new(self.x1, self.y2),
        ]
    }

    /// Box area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }
}

/// Configuration for the detection-to-GeoJSON pipeline.
///
/// Every value that used to be a process-wide constant lives here so
/// tile tasks stay independently testable and safe to run in parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ground sampling distance: meters covered by one pixel.
    pub meters_per_pixel: f64,

    /// Degrees of latitude per meter (longitude at the equator).
    pub degrees_per_meter: f64,

    /// Minimum detector confidence for masks and boxes, in `[0, 1]`.
    pub confidence_threshold: f32,

    /// Rooftop polygons with a smaller pixel area are dropped.
    pub min_pixel_area: f64,

    /// Mapped polygons with a smaller area (square degrees) are dropped.
    pub min_geo_area: f64,

    /// Mask pixels strictly above this value are foreground.
    pub mask_threshold: u8,

    /// Drop contour vertices lying on straight runs before validation.
    pub compress_contours: bool,

    /// Aggregate coverage per ward instead of once for the whole run.
    pub group_by_ward: bool,

    /// Which contour tracing algorithm to use.
    pub contour_tracer: ContourTracerKind,
}

impl PipelineConfig {
    /// Default ground sampling distance (approximately zoom level 20).
    pub const DEFAULT_METERS_PER_PIXEL: f64 = 0.145;
    /// Default degrees per meter at the equator.
    pub const DEFAULT_DEGREES_PER_METER: f64 = 1.0 / 111_320.0;
    /// Default detector confidence threshold.
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
    /// Default minimum rooftop area in square pixels.
    pub const DEFAULT_MIN_PIXEL_AREA: f64 = 10.0;
    /// Default minimum mapped area in square degrees.
    pub const DEFAULT_MIN_GEO_AREA: f64 = 1e-14;
    /// Default mask binarisation threshold.
    pub const DEFAULT_MASK_THRESHOLD: u8 = 127;

    /// Check the configuration for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.meters_per_pixel.is_finite() || self.meters_per_pixel <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "meters_per_pixel must be finite and positive, got {}",
                self.meters_per_pixel
            )));
        }
        if !self.degrees_per_meter.is_finite() || self.degrees_per_meter <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "degrees_per_meter must be finite and positive, got {}",
                self.degrees_per_meter
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.min_pixel_area.is_nan() || self.min_pixel_area < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_pixel_area must be non-negative, got {}",
                self.min_pixel_area
            )));
        }
        if self.min_geo_area.is_nan() || self.min_geo_area < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_geo_area must be non-negative, got {}",
                self.min_geo_area
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            meters_per_pixel: Self::DEFAULT_METERS_PER_PIXEL,
            degrees_per_meter: Self::DEFAULT_DEGREES_PER_METER,
            confidence_threshold: Self::DEFAULT_CONFIDENCE_THRESHOLD,
            min_pixel_area: Self::DEFAULT_MIN_PIXEL_AREA,
            min_geo_area: Self::DEFAULT_MIN_GEO_AREA,
            mask_threshold: Self::DEFAULT_MASK_THRESHOLD,
            compress_contours: true,
            group_by_ward: true,
            contour_tracer: ContourTracerKind::default(),
        }
    }
}

/// Errors that can occur during pipeline processing.
///
/// Only [`PipelineError::InvalidConfig`] aborts a run. The other
/// variants are tile-scoped: the tile is reported as failed and its
/// siblings carry on.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The tile center cannot be mapped (non-finite, or at a pole where
    /// the longitude scale diverges).
    #[error("tile center ({lat}, {lon}) cannot be mapped")]
    InvalidTileCenter {
        /// Latitude of the rejected center.
        lat: f64,
        /// Longitude of the rejected center.
        lon: f64,
    },

    /// The tile raster could not be read.
    #[error("cannot load tile {tile_id}: {reason}")]
    TileLoad {
        /// Identifier of the tile.
        tile_id: String,
        /// What went wrong.
        reason: String,
    },

    /// The detector failed for this tile.
    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// Drop consecutive duplicates and an explicit closing vertex.
fn open_ring(mut points: Vec<Point>) -> Vec<Point> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn ring_polygon(ring: &[Point]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = ring.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    Polygon::new(LineString::from(coords), vec![])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    // --- PixelPolygon tests ---

    #[test]
    fn pixel_polygon_accepts_square() {
        let poly = PixelPolygon::try_new(square(0.0, 0.0, 10.0)).unwrap();
        assert_eq!(poly.len(), 4);
        assert!((poly.area() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pixel_polygon_strips_closing_vertex() {
        let mut ring = square(0.0, 0.0, 4.0);
        ring.push(Point::new(0.0, 0.0));
        let poly = PixelPolygon::try_new(ring).unwrap();
        assert_eq!(poly.len(), 4);
    }

    #[test]
    fn pixel_polygon_rejects_two_points() {
        let result = PixelPolygon::try_new(vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0)]);
        assert_eq!(result, Err(PolygonRejection::TooFewPoints));
    }

    #[test]
    fn pixel_polygon_rejects_repeated_points() {
        let result = PixelPolygon::try_new(vec![
            Point::new(1.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(1.0, 1.0),
        ]);
        assert_eq!(result, Err(PolygonRejection::TooFewPoints));
    }

    #[test]
    fn pixel_polygon_rejects_collinear_ring() {
        let result = PixelPolygon::try_new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ]);
        assert_eq!(result, Err(PolygonRejection::ZeroArea));
    }

    #[test]
    fn pixel_polygon_rejects_bow_tie() {
        let result = PixelPolygon::try_new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 4.0),
        ]);
        assert_eq!(result, Err(PolygonRejection::SelfIntersecting));
    }

    #[test]
    fn pixel_polygon_rejects_nan() {
        let result = PixelPolygon::try_new(vec![
            Point::new(0.0, 0.0),
            Point::new(f64::NAN, 0.0),
            Point::new(1.0, 1.0),
        ]);
        assert_eq!(result, Err(PolygonRejection::NonFinite));
    }

    // --- GeoPolygon tests ---

    #[test]
    fn geo_polygon_enforces_min_area() {
        let poly = PixelPolygon::try_new(square(0.0, 0.0, 1e-4)).unwrap();
        let result = GeoPolygon::try_new(poly.to_polygon(), 1e-6);
        assert_eq!(result, Err(PolygonRejection::BelowMinimumArea));
    }

    #[test]
    fn geo_polygon_vertex_count_excludes_closing_coord() {
        let poly = PixelPolygon::try_new(square(77.0, 12.0, 0.001)).unwrap();
        let geo = GeoPolygon::try_new(poly.to_polygon(), 0.0).unwrap();
        assert_eq!(geo.vertex_count(), poly.len());
        assert_eq!(geo.exterior_coords().count(), poly.len() + 1);
    }

    #[test]
    fn geo_polygon_rejects_flattened_ring() {
        let ring = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]);
        let result = GeoPolygon::try_new(Polygon::new(ring, vec![]), 0.0);
        assert_eq!(result, Err(PolygonRejection::ZeroArea));
    }

    // --- PanelBox tests ---

    #[test]
    fn panel_box_normalises_corners() {
        let b = PanelBox::new(10.0, 20.0, 2.0, 4.0, 0.5);
        assert!((b.x1 - 2.0).abs() < f64::EPSILON);
        assert!((b.y1 - 4.0).abs() < f64::EPSILON);
        assert!((b.area() - 128.0).abs() < f64::EPSILON);
    }

    // --- PipelineConfig tests ---

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_zero_ground_sampling_distance() {
        let config = PipelineConfig {
            meters_per_pixel: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_rejects_confidence_above_one() {
        let config = PipelineConfig {
            confidence_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"meters_per_pixel": 0.3, "group_by_ward": false}"#).unwrap();
        assert!((config.meters_per_pixel - 0.3).abs() < f64::EPSILON);
        assert!(!config.group_by_ward);
        assert!((config.confidence_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn tile_dimensions_follow_image() {
        let tile = Tile::new("t.png", GeoCenter::new(0.0, 0.0), RgbImage::new(64, 32));
        assert_eq!(
            tile.dimensions(),
            Dimensions {
                width: 64,
                height: 32
            }
        );
        assert!(tile.ward.is_none());
        assert_eq!(tile.with_ward("w1").ward.as_deref(), Some("w1"));
    }
}
