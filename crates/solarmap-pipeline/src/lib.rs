//! solarmap-pipeline: Detection-to-GeoJSON aggregation engine (sans-IO).
//!
//! Turns per-tile rooftop segmentation masks and solar panel boxes into
//! geo-referenced features through:
//! mask binarisation -> contour tracing -> polygon validation ->
//! pixel-to-geographic mapping -> rooftop/panel association ->
//! per-ward dissolve with adoption counts.
//!
//! This crate has **no I/O dependencies** -- tiles arrive as in-memory
//! rasters, the segmentation model is reached through the [`Detector`]
//! trait, and results come back as a [`FeatureCollection`]. Filesystem
//! discovery and serialization live in `solarmap-io` and
//! `solarmap-export`.

pub mod aggregate;
pub mod associate;
pub mod contour;
pub mod detect;
pub mod diagnostics;
pub mod emit;
pub mod engine;
pub mod extract;
pub mod feature;
pub mod mapping;
pub mod source;
pub mod types;

pub use aggregate::{AdoptionStats, aggregate_group};
pub use contour::{ContourTracer, ContourTracerKind};
pub use detect::{DetectError, Detections, Detector, InMemoryDetector, ScoredMask};
pub use diagnostics::{DropCounts, RunSummary, TileFailure};
pub use emit::{RooftopEntry, TileFeatures, emit_tile};
pub use engine::{
    RunOutput, TileOutcome, process_source, process_tile, run, run_with_projection,
};
pub use feature::{
    CoverageFeature, CoverageKind, Feature, FeatureCollection, PanelFeature, RooftopFeature,
};
pub use mapping::{CoordinateMapper, FlatEarth, FlatEarthMapper, Projection};
pub use source::TileSource;
pub use types::{
    Dimensions, GeoCenter, GeoPolygon, PanelBox, PipelineConfig, PipelineError, PixelPolygon,
    Point, PolygonRejection, Tile,
};
