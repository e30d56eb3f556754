//! Rooftop/panel association.
//!
//! A rooftop has solar when any panel footprint on the same tile
//! intersects it (boundary contact counts; containment is not required).
//! Panels are never deduplicated: a panel touching two rooftops is
//! reported for both, and neighbouring tiles that re-detect the same
//! physical panel each report it.

use geo::{BoundingRect, Intersects};

use crate::types::GeoPolygon;

/// Result of matching one rooftop against a tile's panels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    /// Indices into the panel slice, in panel order.
    pub panel_indices: Vec<usize>,
}

impl Association {
    /// `true` iff at least one panel intersects the rooftop.
    #[must_use]
    pub fn has_solar(&self) -> bool {
        !self.panel_indices.is_empty()
    }
}

/// Find every panel intersecting `rooftop`.
#[must_use = "returns the matched panels"]
pub fn associate(rooftop: &GeoPolygon, panels: &[GeoPolygon]) -> Association {
    let envelope = rooftop.polygon().bounding_rect();

    let panel_indices = panels
        .iter()
        .enumerate()
        .filter(|(_, panel)| {
            // Cheap rejection before the exact test.
            let bbox_hit = match (envelope, panel.polygon().bounding_rect()) {
                (Some(a), Some(b)) => a.intersects(&b),
                _ => false,
            };
            bbox_hit && rooftop.polygon().intersects(panel.polygon())
        })
        .map(|(i, _)| i)
        .collect();

    Association { panel_indices }
}
