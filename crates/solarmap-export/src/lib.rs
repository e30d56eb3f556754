//! solarmap-export: Pure format serializers (sans-IO)
//!
//! Converts a [`FeatureCollection`](solarmap_pipeline::FeatureCollection)
//! into output formats: GeoJSON for downstream GIS tools, an SVG
//! coverage preview, and per-tile raster overlays for eyeballing model
//! output. Every function returns data; writing it anywhere is the
//! caller's job.

pub mod geojson;
pub mod overlay;
pub mod svg;

pub use geojson::{ExportError, to_geojson_string, to_geojson_value};
pub use overlay::{OverlayLayers, OverlayStyle, render_overlay};
pub use svg::{SvgStyle, to_svg};
