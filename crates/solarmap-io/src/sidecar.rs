//! Detection sidecars: precomputed model output stored next to tiles.
//!
//! The model for tile `X.png` writes `X.detections.json`:
//!
//! ```json
//! { "rooftops": [ { "mask": "X.roof0.png", "confidence": 0.91 } ],
//!   "panels":   [ { "bbox": [10, 20, 40, 60], "confidence": 0.72 } ] }
//! ```
//!
//! Mask paths are relative to the sidecar's directory. [`SidecarDetector`]
//! serves these files through the pipeline's [`Detector`] trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use solarmap_pipeline::{DetectError, Detector, PanelBox, Tile, TileSource, types::GrayImage};

use crate::IoError;
use crate::tiles::DiscoveredTile;

/// Suffix replacing a tile's `.png` extension.
pub const SIDECAR_SUFFIX: &str = "detections.json";

/// One rooftop mask reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarMask {
    /// Mask image path, relative to the sidecar.
    pub mask: PathBuf,
    /// Detector confidence.
    pub confidence: f32,
}

/// One panel box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarBox {
    /// `[x1, y1, x2, y2]` in tile pixels.
    pub bbox: [f64; 4],
    /// Detector confidence.
    pub confidence: f32,
}

/// Model output for one tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Rooftop segmentation masks.
    #[serde(default)]
    pub rooftops: Vec<SidecarMask>,
    /// Solar panel boxes.
    #[serde(default)]
    pub panels: Vec<SidecarBox>,
}

/// Sidecar path for a tile image: `dir/X.png` becomes `dir/X.detections.json`.
#[must_use]
pub fn sidecar_path(tile_path: &Path) -> PathBuf {
    tile_path.with_extension(SIDECAR_SUFFIX)
}

/// Read and parse a sidecar file.
///
/// # Errors
///
/// Returns [`IoError::Read`] if the file cannot be read and
/// [`IoError::Sidecar`] if it is not a valid sidecar.
pub fn load_sidecar(path: &Path) -> Result<Sidecar, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| IoError::Sidecar {
        path: path.to_path_buf(),
        source,
    })
}

/// [`Detector`] reading precomputed model output from sidecar files.
///
/// Tiles are looked up by `(ward, tile id)`, so tiles with the same file
/// name in different wards stay apart. Sidecars are read on demand from
/// the worker threads.
#[derive(Debug, Clone, Default)]
pub struct SidecarDetector {
    sidecars: HashMap<(Option<String>, String), PathBuf>,
}

impl SidecarDetector {
    /// Create a detector with no registered tiles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sidecar for one tile.
    pub fn register<S: TileSource + ?Sized>(&mut self, tile: &S, sidecar: PathBuf) {
        self.sidecars.insert(
            (tile.ward().map(str::to_owned), tile.id().to_owned()),
            sidecar,
        );
    }

    /// Register every discovered tile.
    ///
    /// Without `detections_dir` each sidecar sits next to its tile. With
    /// it, the tile directory structure under `tiles_root` is mirrored
    /// under `detections_dir`.
    #[must_use]
    pub fn for_tiles(
        tiles: &[DiscoveredTile],
        tiles_root: &Path,
        detections_dir: Option<&Path>,
    ) -> Self {
        let mut detector = Self::new();
        for discovered in tiles {
            let local = sidecar_path(&discovered.path);
            let sidecar = match detections_dir {
                Some(dir) => match local.strip_prefix(tiles_root) {
                    Ok(relative) => dir.join(relative),
                    Err(_) => dir.join(local.file_name().unwrap_or_default()),
                },
                None => local,
            };
            detector.register(discovered, sidecar);
        }
        detector
    }

    /// Number of registered tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sidecars.len()
    }

    /// Returns `true` if no tile is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sidecars.is_empty()
    }

    fn load(&self, tile: &Tile) -> Result<(PathBuf, Sidecar), DetectError> {
        let path = self
            .sidecars
            .get(&(tile.ward.clone(), tile.id.clone()))
            .ok_or_else(|| DetectError::Unavailable {
                tile_id: tile.id.clone(),
                reason: String::from("no sidecar registered"),
            })?;
        match load_sidecar(path) {
            Ok(sidecar) => Ok((path.clone(), sidecar)),
            Err(e @ IoError::Sidecar { .. }) => Err(DetectError::Malformed {
                tile_id: tile.id.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(DetectError::Unavailable {
                tile_id: tile.id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Detector for SidecarDetector {
    fn detect_rooftops(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<GrayImage>, DetectError> {
        let (path, sidecar) = self.load(tile)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        sidecar
            .rooftops
            .iter()
            .filter(|m| m.confidence >= confidence_threshold)
            .map(|m| {
                let mask_path = dir.join(&m.mask);
                image::open(&mask_path)
                    .map(|img| img.to_luma8())
                    .map_err(|e| DetectError::Malformed {
                        tile_id: tile.id.clone(),
                        reason: format!("cannot read mask {}: {e}", mask_path.display()),
                    })
            })
            .collect()
    }

    fn detect_panels(
        &self,
        tile: &Tile,
        confidence_threshold: f32,
    ) -> Result<Vec<PanelBox>, DetectError> {
        let (_, sidecar) = self.load(tile)?;
        Ok(sidecar
            .panels
            .iter()
            .filter(|b| b.confidence >= confidence_threshold)
            .map(|b| {
                let [x1, y1, x2, y2] = b.bbox;
                PanelBox::new(x1, y1, x2, y2, b.confidence)
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_tile() {
        assert_eq!(
            sidecar_path(Path::new("tiles/w1/tile_1.5_2.5.png")),
            PathBuf::from("tiles/w1/tile_1.5_2.5.detections.json")
        );
    }

    #[test]
    fn missing_arrays_default_to_empty() {
        let sidecar: Sidecar = serde_json::from_str("{}").unwrap();
        assert_eq!(sidecar, Sidecar::default());
    }

    #[test]
    fn parses_documented_format() {
        let sidecar: Sidecar = serde_json::from_str(
            r#"{ "rooftops": [ { "mask": "X.roof0.png", "confidence": 0.91 } ],
                 "panels":   [ { "bbox": [10, 20, 40, 60], "confidence": 0.72 } ] }"#,
        )
        .unwrap();
        assert_eq!(sidecar.rooftops[0].mask, PathBuf::from("X.roof0.png"));
        assert_eq!(sidecar.panels[0].bbox, [10.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn unregistered_tile_is_unavailable() {
        let tile = Tile::new(
            "a.png",
            solarmap_pipeline::GeoCenter::new(0.0, 0.0),
            solarmap_pipeline::types::RgbImage::new(4, 4),
        );
        let result = SidecarDetector::new().detect_panels(&tile, 0.3);
        assert!(matches!(result, Err(DetectError::Unavailable { .. })));
    }
}
