//! Contour tracing: extract outer boundary rings from a binary mask.
//!
//! This module defines the [`ContourTracer`] trait for pluggable tracing
//! algorithms and the [`ContourTracerKind`] enum for selecting one at
//! runtime through [`PipelineConfig`](crate::PipelineConfig).
//!
//! Rooftop masks only contribute their outer boundaries: holes inside a
//! region (courtyards, segmentation noise) and regions nested inside
//! those holes are ignored.

use image::GrayImage;
use imageproc::contours::BorderType;
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourTracerKind {
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`,
    /// keeping only outermost borders.
    #[default]
    ExternalBorders,
}

/// Trait for contour tracing strategies.
///
/// Input: a binary mask (non-zero pixels = foreground).
/// Output: one open ring of pixel-center coordinates per region.
pub trait ContourTracer {
    /// Trace region boundaries in the given binary mask.
    fn trace(&self, mask: &GrayImage) -> Vec<Vec<Point>>;
}

impl ContourTracer for ContourTracerKind {
    fn trace(&self, mask: &GrayImage) -> Vec<Vec<Point>> {
        match *self {
            Self::ExternalBorders => trace_external_borders(mask),
        }
    }
}

fn trace_external_borders(mask: &GrayImage) -> Vec<Vec<Point>> {
    let contours: Vec<imageproc::contours::Contour<u32>> =
        imageproc::contours::find_contours(mask);

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect()
        })
        .collect()
}

/// Remove vertices lying in the middle of a straight run.
///
/// Border following emits every boundary pixel. A vertex is dropped when
/// the step arriving at it and the step leaving it point in the same
/// direction, which leaves only the corners of horizontal, vertical and
/// diagonal runs. Doubling back (a one-pixel spur) is kept so the ring
/// still reports its degeneracy to validation.
#[must_use = "returns the compressed ring"]
pub fn compress_collinear(ring: &[Point]) -> Vec<Point> {
    let n = ring.len();
    if n < 3 {
        return ring.to_vec();
    }

    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let cur = ring[i];
            let next = ring[(i + 1) % n];
            !continues_straight(prev, cur, next)
        })
        .map(|i| ring[i])
        .collect()
}

fn continues_straight(prev: Point, cur: Point, next: Point) -> bool {
    let (ax, ay) = (cur.x - prev.x, cur.y - prev.y);
    let (bx, by) = (next.x - cur.x, next.y - cur.y);
    let cross = ax.mul_add(by, -(ay * bx));
    let dot = ax.mul_add(bx, ay * by);
    cross.abs() < f64::EPSILON && dot > 0.0
}
