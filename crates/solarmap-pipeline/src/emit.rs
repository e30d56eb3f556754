//! Tile feature emission.
//!
//! Everything here is tile-local: one tile's detections and mapper in,
//! that tile's rooftop and panel features out. Nothing is shared with
//! other tiles, so tiles can be emitted in parallel.

use crate::associate::associate;
use crate::detect::Detections;
use crate::diagnostics::DropCounts;
use crate::extract::{extract_polygons, prepare_mask};
use crate::feature::{PanelFeature, RooftopFeature};
use crate::mapping::CoordinateMapper;
use crate::types::{Dimensions, GeoPolygon, PipelineConfig};

/// A rooftop together with the panels matched to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RooftopEntry {
    /// The rooftop feature.
    pub rooftop: RooftopFeature,
    /// One panel feature per intersecting panel, in detector order.
    pub panels: Vec<PanelFeature>,
}

/// Features emitted for one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFeatures {
    /// Identifier of the tile.
    pub tile_id: String,
    /// Ward of the tile, if known.
    pub ward: Option<String>,
    /// Rooftops in extraction order (mask order, then contour order).
    pub entries: Vec<RooftopEntry>,
    /// Candidates dropped along the way.
    pub dropped: DropCounts,
}

impl TileFeatures {
    /// Number of panel features across all rooftops.
    #[must_use]
    pub fn panel_count(&self) -> usize {
        self.entries.iter().map(|e| e.panels.len()).sum()
    }
}

/// Emit the rooftop and panel features of one tile.
///
/// Runs extraction on every mask, maps rooftops and panel boxes to
/// geographic coordinates, drops anything that fails validation after
/// mapping, and matches panels to rooftops.
#[must_use = "returns the tile's features"]
pub fn emit_tile<M: CoordinateMapper>(
    tile_id: &str,
    ward: Option<&str>,
    dimensions: Dimensions,
    detections: &Detections,
    mapper: &M,
    config: &PipelineConfig,
) -> TileFeatures {
    let mut dropped = DropCounts::default();

    let panels: Vec<GeoPolygon> = detections
        .panel_boxes
        .iter()
        .filter_map(|b| match GeoPolygon::try_new(mapper.map_box(b), config.min_geo_area) {
            Ok(geo) => Some(geo),
            Err(reason) => {
                log::debug!("{tile_id}: dropping panel box {b:?}: {reason:?}");
                dropped.panels += 1;
                None
            }
        })
        .collect();

    let mut entries = Vec::new();
    for mask in &detections.rooftop_masks {
        let mask = prepare_mask(mask, dimensions, config.mask_threshold);
        let extraction = extract_polygons(&mask, config);
        dropped.record_all(&extraction.rejected);

        for pixel_polygon in extraction.polygons {
            let mapped = mapper.map_ring(pixel_polygon.points());
            let geometry = match GeoPolygon::try_new(mapped, config.min_geo_area) {
                Ok(geometry) => geometry,
                Err(reason) => {
                    log::debug!("{tile_id}: dropping rooftop after mapping: {reason:?}");
                    dropped.after_mapping += 1;
                    continue;
                }
            };

            let association = associate(&geometry, &panels);
            let panel_features = association
                .panel_indices
                .iter()
                .map(|&i| PanelFeature {
                    geometry: panels[i].clone(),
                    ward: ward.map(str::to_owned),
                    belongs_to: tile_id.to_owned(),
                })
                .collect();

            entries.push(RooftopEntry {
                rooftop: RooftopFeature {
                    geometry,
                    ward: ward.map(str::to_owned),
                    tile_id: tile_id.to_owned(),
                    pixel_area: pixel_polygon.area(),
                    has_solar: association.has_solar(),
                },
                panels: panel_features,
            });
        }
    }

    TileFeatures {
        tile_id: tile_id.to_owned(),
        ward: ward.map(str::to_owned),
        entries,
        dropped,
    }
}
