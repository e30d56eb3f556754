//! Mask-to-polygon extraction.
//!
//! Turns one rooftop mask into the simple pixel-space polygons it
//! contains. A mask may contain several disjoint regions or none at all;
//! an empty result is not an error.

use image::GrayImage;
use image::imageops::FilterType;

use crate::contour::{ContourTracer, compress_collinear};
use crate::types::{Dimensions, PipelineConfig, PixelPolygon, PolygonRejection};

/// Polygons extracted from one mask plus the reasons candidates were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Valid polygons at or above the minimum pixel area.
    pub polygons: Vec<PixelPolygon>,
    /// One entry per rejected contour.
    pub rejected: Vec<PolygonRejection>,
}

/// Bring a detector mask to tile resolution and binarise it.
///
/// Models often emit masks at their inference resolution; those are
/// resized with nearest-neighbour sampling so no intermediate values are
/// invented. Pixels strictly above `threshold` become 255, the rest 0.
#[must_use = "returns the prepared mask"]
pub fn prepare_mask(mask: &GrayImage, dimensions: Dimensions, threshold: u8) -> GrayImage {
    let mut prepared = if mask.dimensions() == (dimensions.width, dimensions.height) {
        mask.clone()
    } else {
        log::debug!(
            "resizing {}x{} mask to {}x{}",
            mask.width(),
            mask.height(),
            dimensions.width,
            dimensions.height
        );
        image::imageops::resize(
            mask,
            dimensions.width,
            dimensions.height,
            FilterType::Nearest,
        )
    };

    for pixel in prepared.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
    prepared
}

/// Extract simple polygons from a binary mask.
///
/// Traces outer contours, optionally compresses straight runs, then
/// rejects rings with fewer than three distinct points, zero area,
/// self-intersections, or an area below `config.min_pixel_area`.
#[must_use = "returns the extracted polygons"]
pub fn extract_polygons(mask: &GrayImage, config: &PipelineConfig) -> Extraction {
    let mut extraction = Extraction::default();

    for ring in config.contour_tracer.trace(mask) {
        let ring = if config.compress_contours {
            compress_collinear(&ring)
        } else {
            ring
        };

        match PixelPolygon::try_new(ring) {
            Ok(polygon) if polygon.area() >= config.min_pixel_area => {
                extraction.polygons.push(polygon);
            }
            Ok(polygon) => {
                log::debug!("dropping rooftop of {} px²: below minimum", polygon.area());
                extraction.rejected.push(PolygonRejection::BelowMinimumArea);
            }
            Err(reason) => {
                log::debug!("dropping rooftop contour: {reason:?}");
                extraction.rejected.push(reason);
            }
        }
    }

    extraction
}
