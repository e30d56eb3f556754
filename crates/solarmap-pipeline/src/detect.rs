//! The segmentation/detection capability the pipeline consumes.
//!
//! The model itself lives outside this crate. Anything able to produce
//! rooftop masks and panel boxes for a [`Tile`] implements [`Detector`]:
//! a model runtime, a reader for precomputed model output (see
//! `solarmap-io`), or the [`InMemoryDetector`] used by tests.

use std::collections::HashMap;

use image::GrayImage;

use crate::types::{PanelBox, Tile};

/// Why a detector could not produce output for a tile.
///
/// Always tile-scoped: the engine records the failure and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectError {
    /// The model (or its stored output) is not available for this tile.
    #[error("detector unavailable for tile {tile_id}: {reason}")]
    Unavailable {
        /// Tile the detector was invoked for.
        tile_id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The detector produced output that cannot be interpreted.
    #[error("malformed detector output for tile {tile_id}: {reason}")]
    Malformed {
        /// Tile the detector was invoked for.
        tile_id: String,
        /// Human-readable cause.
        reason: String,
    },
}

/// A rooftop mask with the detector's confidence.
#[derive(Debug, Clone)]
pub struct ScoredMask {
    /// Single-channel mask, binarised with
    /// [`PipelineConfig::mask_threshold`](crate::PipelineConfig::mask_threshold).
    pub mask: GrayImage,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Detector output for one tile, already filtered by confidence.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    /// Rooftop segmentation masks.
    pub rooftop_masks: Vec<GrayImage>,
    /// Solar panel boxes in pixel space.
    pub panel_boxes: Vec<PanelBox>,
}

/// Rooftop segmentation and panel detection for a single tile.
///
/// Implementations must be shareable across the worker pool. Returning
/// empty vectors means "nothing detected" and is not a failure.
pub trait Detector: Sync {
    /// Rooftop masks at or above `confidence_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError`] when the model cannot be invoked for the tile.
    fn detect_rooftops(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<GrayImage>, DetectError>;

    /// Panel boxes at or above `confidence_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError`] when the model cannot be invoked for the tile.
    fn detect_panels(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<PanelBox>, DetectError>;
}

/// Detector backed by precomputed, in-memory results keyed by tile id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDetector {
    entries: HashMap<String, (Vec<ScoredMask>, Vec<PanelBox>)>,
}

impl InMemoryDetector {
    /// Create an empty detector. Every tile is "unavailable" until inserted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the raw detections for a tile, replacing any previous entry.
    pub fn insert(
        &mut self,
        tile_id: impl Into<String>,
        masks: Vec<ScoredMask>,
        boxes: Vec<PanelBox>,
    ) {
        self.entries.insert(tile_id.into(), (masks, boxes));
    }

    fn entry(&self, tile: &Tile) -> Result<&(Vec<ScoredMask>, Vec<PanelBox>), DetectError> {
        self.entries
            .get(&tile.id)
            .ok_or_else(|| DetectError::Unavailable {
                tile_id: tile.id.clone(),
                reason: String::from("no detections registered"),
            })
    }
}

impl Detector for InMemoryDetector {
    fn detect_rooftops(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<GrayImage>, DetectError> {
        let (masks, _) = self.entry(tile)?;
        Ok(masks
            .iter()
            .filter(|m| m.confidence >= confidence_threshold)
            .map(|m| m.mask.clone())
            .collect())
    }

    fn detect_panels(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<PanelBox>, DetectError> {
        let (_, boxes) = self.entry(tile)?;
        Ok(boxes
            .iter()
            .filter(|b| b.confidence >= confidence_threshold)
            .copied()
            .collect())
    }
}
