//! Raster detection overlay.
//!
//! Draws a tile's rooftops (translucent fill, white outline) and panel
//! boxes onto a copy of the tile image, for checking model output against
//! the imagery. Features are brought back into pixel space with the
//! tile's [`CoordinateMapper`].

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_polygon_mut, draw_polygon_mut};
use imageproc::point::Point as RasterPoint;

use solarmap_pipeline::{CoordinateMapper, FeatureCollection, GeoPolygon, Point};

/// Colours for [`render_overlay`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Fill for rooftops with solar.
    pub with_solar_fill: Rgb<u8>,
    /// Fill for rooftops without solar.
    pub without_solar_fill: Rgb<u8>,
    /// Rooftop outline.
    pub rooftop_outline: Rgb<u8>,
    /// Panel box outline.
    pub panel_outline: Rgb<u8>,
    /// Fill opacity in `[0, 1]`.
    pub fill_alpha: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            with_solar_fill: Rgb([46, 204, 64]),
            without_solar_fill: Rgb([255, 65, 54]),
            rooftop_outline: Rgb([255, 255, 255]),
            panel_outline: Rgb([255, 220, 0]),
            fill_alpha: 0.4,
        }
    }
}

/// Pixel-space shapes to draw on one tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayLayers {
    /// Rooftop rings with their `has_solar` flag.
    pub rooftops: Vec<(Vec<Point>, bool)>,
    /// Panel rings.
    pub panels: Vec<Vec<Point>>,
}

impl OverlayLayers {
    /// Collect the features detected on the tile `(ward, tile_id)`,
    /// projected back into that tile's pixel space.
    ///
    /// Tile ids are only unique within a ward, so both must match.
    #[must_use]
    pub fn for_tile<M: CoordinateMapper>(
        features: &FeatureCollection,
        tile_id: &str,
        ward: Option<&str>,
        mapper: &M,
    ) -> Self {
        let to_pixels = |geometry: &GeoPolygon| -> Vec<Point> {
            geometry
                .exterior_coords()
                .map(|&c| mapper.to_pixel(c))
                .collect()
        };
        Self {
            rooftops: features
                .rooftops()
                .filter(|r| r.tile_id == tile_id && r.ward.as_deref() == ward)
                .map(|r| (to_pixels(&r.geometry), r.has_solar))
                .collect(),
            panels: features
                .panels()
                .filter(|p| p.belongs_to == tile_id && p.ward.as_deref() == ward)
                .map(|p| to_pixels(&p.geometry))
                .collect(),
        }
    }

    /// Returns `true` if there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooftops.is_empty() && self.panels.is_empty()
    }
}

/// Round a ring onto the raster grid.
///
/// `imageproc` rejects rings whose first and last points coincide, so
/// the closing point and consecutive duplicates are dropped. Returns
/// `None` when fewer than three distinct points remain.
#[allow(clippy::cast_possible_truncation)]
fn raster_ring(ring: &[Point]) -> Option<Vec<RasterPoint<i32>>> {
    let mut points: Vec<RasterPoint<i32>> = ring
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| RasterPoint::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    (points.len() >= 3).then_some(points)
}

#[allow(clippy::cast_precision_loss)]
fn outline(ring: &[RasterPoint<i32>]) -> Vec<RasterPoint<f32>> {
    ring.iter()
        .map(|p| RasterPoint::new(p.x as f32, p.y as f32))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(base: Rgb<u8>, over: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |b: u8, o: u8| {
        (f32::from(o) * alpha + f32::from(b) * (1.0 - alpha))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgb([
        mix(base[0], over[0]),
        mix(base[1], over[1]),
        mix(base[2], over[2]),
    ])
}

/// Draw `layers` onto a copy of `image`.
///
/// Degenerate rings (fewer than three distinct raster points) are skipped.
#[must_use]
pub fn render_overlay(image: &RgbImage, layers: &OverlayLayers, style: &OverlayStyle) -> RgbImage {
    let mut out = image.clone();
    let alpha = style.fill_alpha.clamp(0.0, 1.0);

    // Fills first, one coverage mask per colour so overlapping rooftops
    // blend once rather than compounding.
    for (has_solar, colour) in [
        (false, style.without_solar_fill),
        (true, style.with_solar_fill),
    ] {
        let mut mask = GrayImage::new(image.width(), image.height());
        let mut any = false;
        for ring in layers
            .rooftops
            .iter()
            .filter(|(_, solar)| *solar == has_solar)
            .filter_map(|(ring, _)| raster_ring(ring))
        {
            draw_polygon_mut(&mut mask, &ring, Luma([255]));
            any = true;
        }
        if !any {
            continue;
        }
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if mask.get_pixel(x, y)[0] > 0 {
                *pixel = blend(*pixel, colour, alpha);
            }
        }
    }

    for ring in layers.rooftops.iter().filter_map(|(ring, _)| raster_ring(ring)) {
        draw_hollow_polygon_mut(&mut out, &outline(&ring), style.rooftop_outline);
    }
    for ring in layers.panels.iter().filter_map(|ring| raster_ring(ring)) {
        draw_hollow_polygon_mut(&mut out, &outline(&ring), style.panel_outline);
    }

    out
}
