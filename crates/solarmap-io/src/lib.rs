//! solarmap-io: Filesystem collaborators for the solarmap pipeline.
//!
//! The pipeline core never touches the disk. This crate supplies what
//! it needs from the outside world:
//!
//! - [`tiles`]: walk a tile directory (flat or one sub-directory per
//!   ward) and decode tiles, reading each tile's center from its file name.
//! - [`sidecar`]: a [`Detector`](solarmap_pipeline::Detector) backed by
//!   JSON files holding precomputed model output.
//! - [`output`]: write GeoJSON, SVG previews and PNG overlays.

pub mod output;
pub mod sidecar;
pub mod tiles;

use std::path::PathBuf;

pub use output::{write_geojson, write_overlays, write_svg, write_text};
pub use sidecar::{Sidecar, SidecarBox, SidecarDetector, SidecarMask, load_sidecar, sidecar_path};
pub use tiles::{
    DiscoveredTile, SkippedTile, TileLayout, TileNameError, TileScan, discover_tiles,
    parse_tile_center,
};

/// Errors from reading or writing solarmap files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The tile root is missing or is not a directory.
    #[error("{} is not a directory", path.display())]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// Walking a directory failed.
    #[error("failed to scan {}: {source}", path.display())]
    Walk {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: walkdir::Error,
    },

    /// Reading a file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Decoding or encoding an image failed.
    #[error("image error for {}: {source}", path.display())]
    Image {
        /// Image file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: image::ImageError,
    },

    /// A detection sidecar could not be parsed.
    #[error("malformed sidecar {}: {source}", path.display())]
    Sidecar {
        /// Sidecar file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the output failed.
    #[error(transparent)]
    Export(#[from] solarmap_export::ExportError),
}
