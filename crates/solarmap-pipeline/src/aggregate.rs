//! Ward/collection aggregation: dissolve rooftops and count adoption.
//!
//! Aggregation is the barrier of the run. It consumes the complete set
//! of rooftops of a group, so a partial union is never produced.

use geo::{BooleanOps, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::feature::{CoverageFeature, CoverageKind, RooftopFeature};
use crate::types::GeoPolygon;

/// Solar adoption counts for a group of rooftops.
///
/// `total_rooftops == with_solar + without_solar` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionStats {
    /// Number of rooftops in the group.
    pub total_rooftops: usize,
    /// Rooftops with at least one intersecting panel.
    pub with_solar: usize,
    /// Rooftops without any intersecting panel.
    pub without_solar: usize,
}

impl AdoptionStats {
    /// Count rooftops by `has_solar`.
    pub fn from_rooftops<'a>(rooftops: impl IntoIterator<Item = &'a RooftopFeature>) -> Self {
        let (total_rooftops, with_solar) = rooftops
            .into_iter()
            .fold((0, 0), |(total, solar), r| {
                (total + 1, solar + usize::from(r.has_solar))
            });
        Self {
            total_rooftops,
            with_solar,
            without_solar: total_rooftops - with_solar,
        }
    }

    /// Share of rooftops with solar, `None` for an empty group.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn adoption_rate(&self) -> Option<f64> {
        (self.total_rooftops > 0).then(|| self.with_solar as f64 / self.total_rooftops as f64)
    }
}

/// Dissolve polygons into their combined footprint.
///
/// Unions adjacent pairs level by level, so every run performs the same
/// sequence of boolean operations regardless of thread scheduling, and
/// each level runs in parallel. Returns `None` for an empty input.
#[must_use = "returns the dissolved footprint"]
pub fn dissolve<'a>(
    polygons: impl IntoIterator<Item = &'a GeoPolygon>,
) -> Option<MultiPolygon<f64>> {
    let mut level: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p.polygon().clone()]))
        .collect();

    while level.len() > 1 {
        level = level
            .par_chunks(2)
            .map(|pair| match pair {
                [a, b] => a.union(b),
                [a] => a.clone(),
                _ => MultiPolygon::new(vec![]),
            })
            .collect();
    }

    level.pop()
}

/// Build the coverage feature for one group of rooftops.
///
/// Returns `None` when the group has no rooftops: an empty group never
/// produces a degenerate union.
#[must_use = "returns the coverage feature"]
pub fn aggregate_group<'a>(
    ward: Option<&str>,
    rooftops: impl IntoIterator<Item = &'a RooftopFeature>,
) -> Option<CoverageFeature> {
    let rooftops: Vec<&RooftopFeature> = rooftops.into_iter().collect();
    let geometry = dissolve(rooftops.iter().map(|r| &r.geometry))?;
    let stats = AdoptionStats::from_rooftops(rooftops.iter().copied());

    log::info!(
        "{}: {} rooftops, {} with solar, {} without",
        ward.unwrap_or("all tiles"),
        stats.total_rooftops,
        stats.with_solar,
        stats.without_solar,
    );

    Some(CoverageFeature {
        geometry,
        ward: ward.map(str::to_owned),
        kind: if ward.is_some() {
            CoverageKind::WardOutline
        } else {
            CoverageKind::CoverageMask
        },
        stats,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::{Area, LineString, Polygon};

    use super::*;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> GeoPolygon {
        let ring = LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]);
        GeoPolygon::try_new(Polygon::new(ring, vec![]), 0.0).unwrap()
    }

    fn rooftop(geometry: GeoPolygon, has_solar: bool) -> RooftopFeature {
        RooftopFeature {
            geometry,
            ward: Some(String::from("w")),
            tile_id: String::from("t.png"),
            pixel_area: 1.0,
            has_solar,
        }
    }

    #[test]
    fn empty_group_produces_no_coverage() {
        assert!(aggregate_group(Some("w"), Vec::<RooftopFeature>::new().iter()).is_none());
        assert!(dissolve(std::iter::empty()).is_none());
    }

    #[test]
    fn counts_are_consistent() {
        let rooftops = vec![
            rooftop(rect(0.0, 0.0, 1.0, 1.0), true),
            rooftop(rect(2.0, 0.0, 3.0, 1.0), false),
            rooftop(rect(4.0, 0.0, 5.0, 1.0), false),
        ];
        let coverage = aggregate_group(Some("w"), &rooftops).unwrap();
        assert_eq!(coverage.stats.total_rooftops, 3);
        assert_eq!(coverage.stats.with_solar, 1);
        assert_eq!(coverage.stats.without_solar, 2);
        assert_eq!(coverage.kind, CoverageKind::WardOutline);
        assert_eq!(coverage.ward.as_deref(), Some("w"));
    }

    #[test]
    fn ungrouped_coverage_is_a_mask() {
        let rooftops = vec![rooftop(rect(0.0, 0.0, 1.0, 1.0), false)];
        let coverage = aggregate_group(None, &rooftops).unwrap();
        assert_eq!(coverage.kind, CoverageKind::CoverageMask);
        assert!(coverage.ward.is_none());
    }

    #[test]
    fn disjoint_rooftops_sum_their_areas() {
        let rooftops = vec![
            rooftop(rect(0.0, 0.0, 1.0, 1.0), false),
            rooftop(rect(3.0, 0.0, 5.0, 1.0), false),
        ];
        let coverage = aggregate_group(None, &rooftops).unwrap();
        assert!((coverage.geometry.unsigned_area() - 3.0).abs() < 1e-9);
        assert_eq!(coverage.geometry.0.len(), 2);
    }

    #[test]
    fn overlapping_rooftops_dissolve_into_one_part() {
        let rooftops = vec![
            rooftop(rect(0.0, 0.0, 2.0, 2.0), false),
            rooftop(rect(1.0, 1.0, 3.0, 3.0), true),
        ];
        let coverage = aggregate_group(None, &rooftops).unwrap();
        assert_eq!(coverage.geometry.0.len(), 1);
        assert!((coverage.geometry.unsigned_area() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_area_is_bounded_by_max_and_sum() {
        let polygons = [
            rect(0.0, 0.0, 4.0, 4.0),
            rect(2.0, 2.0, 5.0, 5.0),
            rect(10.0, 10.0, 11.0, 12.0),
            rect(3.0, 0.0, 6.0, 1.0),
            rect(0.5, 0.5, 1.5, 1.5),
        ];
        let union = dissolve(polygons.iter()).unwrap().unsigned_area();
        let max = polygons.iter().map(GeoPolygon::area).fold(0.0, f64::max);
        let sum: f64 = polygons.iter().map(GeoPolygon::area).sum();
        assert!(union >= max - 1e-9, "union {union} below max {max}");
        assert!(union <= sum + 1e-9, "union {union} above sum {sum}");
    }

    #[test]
    fn single_polygon_dissolves_to_itself() {
        let p = rect(0.0, 0.0, 2.0, 1.0);
        let union = dissolve(std::iter::once(&p)).unwrap();
        assert_eq!(union.0.len(), 1);
        assert!((union.unsigned_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn adoption_rate() {
        let stats = AdoptionStats {
            total_rooftops: 4,
            with_solar: 1,
            without_solar: 3,
        };
        assert_eq!(stats.adoption_rate(), Some(0.25));
        assert_eq!(AdoptionStats::default().adoption_rate(), None);
    }
}
