//! Run diagnostics: what was processed, what failed, what was dropped.
//!
//! Every call to [`run`](crate::run) returns a [`RunSummary`] alongside
//! the feature collection. Nothing in here influences the output; it
//! exists so operators can tell a quiet tile from a broken one.

use serde::{Deserialize, Serialize};

use crate::types::PolygonRejection;

/// Candidate polygons dropped during a run, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    /// Contours with fewer than three distinct points.
    pub too_few_points: usize,
    /// Contours with non-finite coordinates.
    pub non_finite: usize,
    /// Contours enclosing no area.
    pub zero_area: usize,
    /// Contours crossing or touching themselves.
    pub self_intersecting: usize,
    /// Valid contours below the minimum pixel area.
    pub below_min_area: usize,
    /// Rooftops that became invalid after coordinate mapping.
    pub after_mapping: usize,
    /// Panel boxes that were degenerate or invalid after mapping.
    pub panels: usize,
}

impl DropCounts {
    /// Count one rejected rooftop contour.
    pub const fn record(&mut self, reason: PolygonRejection) {
        match reason {
            PolygonRejection::TooFewPoints => self.too_few_points += 1,
            PolygonRejection::NonFinite => self.non_finite += 1,
            PolygonRejection::ZeroArea => self.zero_area += 1,
            PolygonRejection::SelfIntersecting => self.self_intersecting += 1,
            PolygonRejection::BelowMinimumArea => self.below_min_area += 1,
        }
    }

    /// Count a batch of rejected rooftop contours.
    pub fn record_all(&mut self, reasons: &[PolygonRejection]) {
        for &reason in reasons {
            self.record(reason);
        }
    }

    /// Add another set of counts into this one.
    pub const fn merge(&mut self, other: &Self) {
        self.too_few_points += other.too_few_points;
        self.non_finite += other.non_finite;
        self.zero_area += other.zero_area;
        self.self_intersecting += other.self_intersecting;
        self.below_min_area += other.below_min_area;
        self.after_mapping += other.after_mapping;
        self.panels += other.panels;
    }

    /// Total number of dropped candidates.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.too_few_points
            + self.non_finite
            + self.zero_area
            + self.self_intersecting
            + self.below_min_area
            + self.after_mapping
            + self.panels
    }
}

/// A tile that produced no features because something went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFailure {
    /// Identifier of the failed tile.
    pub tile_id: String,
    /// Ward of the failed tile, if known.
    pub ward: Option<String>,
    /// Display form of the error.
    pub reason: String,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tiles handed to the engine.
    pub tiles_total: usize,
    /// Tiles that produced at least one rooftop mask.
    pub tiles_with_rooftops: usize,
    /// Tiles for which the detector found no rooftop masks.
    pub tiles_without_rooftops: usize,
    /// Tiles that failed; their siblings were still processed.
    pub failures: Vec<TileFailure>,
    /// Rooftop features emitted.
    pub rooftops: usize,
    /// Rooftop features with `has_solar`.
    pub rooftops_with_solar: usize,
    /// Panel features emitted.
    pub panels: usize,
    /// Coverage features emitted.
    pub coverage_features: usize,
    /// Candidates dropped before emission.
    pub dropped: DropCounts,
}

impl RunSummary {
    /// Format a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = vec![
            String::from("Tiles"),
            format!("  total:            {}", self.tiles_total),
            format!("  with rooftops:    {}", self.tiles_with_rooftops),
            format!("  without rooftops: {}", self.tiles_without_rooftops),
            format!("  failed:           {}", self.failures.len()),
        ];
        lines.extend(
            self.failures
                .iter()
                .map(|f| format!("    {}: {}", f.tile_id, f.reason)),
        );

        lines.push(String::from("Features"));
        lines.push(format!(
            "  rooftops:         {} ({} with solar)",
            self.rooftops, self.rooftops_with_solar
        ));
        lines.push(format!("  panels:           {}", self.panels));
        lines.push(format!("  coverage:         {}", self.coverage_features));

        lines.push(format!("Dropped candidates: {}", self.dropped.total()));
        let d = &self.dropped;
        let rows = [
            ("too few points", d.too_few_points),
            ("non-finite", d.non_finite),
            ("zero area", d.zero_area),
            ("self-intersecting", d.self_intersecting),
            ("below min area", d.below_min_area),
            ("invalid after mapping", d.after_mapping),
            ("panel boxes", d.panels),
        ];
        lines.extend(
            rows.into_iter()
                .filter(|&(_, count)| count > 0)
                .map(|(label, count)| format!("  {label:<22}{count}")),
        );

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_routes_each_reason() {
        let mut counts = DropCounts::default();
        counts.record_all(&[
            PolygonRejection::TooFewPoints,
            PolygonRejection::TooFewPoints,
            PolygonRejection::SelfIntersecting,
            PolygonRejection::BelowMinimumArea,
        ]);
        assert_eq!(counts.too_few_points, 2);
        assert_eq!(counts.self_intersecting, 1);
        assert_eq!(counts.below_min_area, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn merge_adds_fields() {
        let mut a = DropCounts {
            zero_area: 1,
            panels: 2,
            ..DropCounts::default()
        };
        let b = DropCounts {
            zero_area: 3,
            after_mapping: 1,
            ..DropCounts::default()
        };
        a.merge(&b);
        assert_eq!(a.zero_area, 4);
        assert_eq!(a.after_mapping, 1);
        assert_eq!(a.panels, 2);
    }

    #[test]
    fn report_lists_failures() {
        let summary = RunSummary {
            tiles_total: 2,
            failures: vec![TileFailure {
                tile_id: String::from("broken.png"),
                ward: None,
                reason: String::from("model unavailable"),
            }],
            ..RunSummary::default()
        };
        let report = summary.report();
        assert!(report.contains("failed:           1"));
        assert!(report.contains("broken.png: model unavailable"));
        assert!(!report.contains("invalid after mapping"));
    }

    #[test]
    fn report_lists_only_nonzero_drop_reasons() {
        let summary = RunSummary {
            dropped: DropCounts {
                after_mapping: 2,
                ..DropCounts::default()
            },
            ..RunSummary::default()
        };
        let report = summary.report();
        assert!(report.contains("Dropped candidates: 2"));
        assert!(report.contains("invalid after mapping 2"));
        assert!(!report.contains("too few points"));
    }

    #[test]
    fn summary_serializes_to_json() {
        let json = serde_json::to_value(RunSummary::default()).unwrap_or_default();
        assert_eq!(json["tiles_total"], 0);
        assert!(json["dropped"].is_object());
    }
}
