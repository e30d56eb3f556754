//! GeoJSON feature collection serializer.
//!
//! A structural transform only: geometry is written exactly as the
//! pipeline produced it, `(lon, lat)` per vertex, rings closed. Each
//! feature kind always carries its full property set, so consumers never
//! have to guess whether `has_solar` or the adoption counts are present.
//!
//! `ward` is omitted (rather than written as `null`) for tiles that
//! were not discovered under a ward.

use geo::{LineString, Polygon};
use serde::Serialize;

use solarmap_pipeline::{CoverageFeature, Feature, FeatureCollection, PanelFeature, RooftopFeature};

/// Errors that can occur while serializing a collection.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON encoding failed.
    #[error("failed to encode GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
}

type Position = [f64; 2];

#[derive(Serialize)]
struct GeoJsonCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<GeoJsonFeature<'a>>,
}

#[derive(Serialize)]
struct GeoJsonFeature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: Properties<'a>,
}

#[derive(Serialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Serialize)]
#[serde(untagged)]
enum Properties<'a> {
    Rooftop {
        #[serde(skip_serializing_if = "Option::is_none")]
        ward: Option<&'a str>,
        image: &'a str,
        class: &'static str,
        area_px: f64,
        has_solar: bool,
    },
    Panel {
        #[serde(skip_serializing_if = "Option::is_none")]
        ward: Option<&'a str>,
        #[serde(rename = "type")]
        kind: &'static str,
        belongs_to: &'a str,
    },
    Coverage {
        #[serde(rename = "type")]
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        ward: Option<&'a str>,
        total_rooftops: usize,
        with_solar: usize,
        without_solar: usize,
    },
}

fn ring(line: &LineString<f64>) -> Vec<Position> {
    line.coords().map(|c| [c.x, c.y]).collect()
}

fn rings(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring)
        .collect()
}

fn rooftop(feature: &RooftopFeature) -> GeoJsonFeature<'_> {
    GeoJsonFeature {
        kind: "Feature",
        geometry: Geometry::Polygon(rings(feature.geometry.polygon())),
        properties: Properties::Rooftop {
            ward: feature.ward.as_deref(),
            image: &feature.tile_id,
            class: "rooftop",
            area_px: feature.pixel_area,
            has_solar: feature.has_solar,
        },
    }
}

fn panel(feature: &PanelFeature) -> GeoJsonFeature<'_> {
    GeoJsonFeature {
        kind: "Feature",
        geometry: Geometry::Polygon(rings(feature.geometry.polygon())),
        properties: Properties::Panel {
            ward: feature.ward.as_deref(),
            kind: "solar_box",
            belongs_to: &feature.belongs_to,
        },
    }
}

fn coverage(feature: &CoverageFeature) -> GeoJsonFeature<'_> {
    // A dissolve that collapsed into one part is written as a plain Polygon.
    let geometry = match feature.geometry.0.as_slice() {
        [single] => Geometry::Polygon(rings(single)),
        parts => Geometry::MultiPolygon(parts.iter().map(rings).collect()),
    };
    GeoJsonFeature {
        kind: "Feature",
        geometry,
        properties: Properties::Coverage {
            kind: feature.kind.as_str(),
            ward: feature.ward.as_deref(),
            total_rooftops: feature.stats.total_rooftops,
            with_solar: feature.stats.with_solar,
            without_solar: feature.stats.without_solar,
        },
    }
}

fn collection(features: &FeatureCollection) -> GeoJsonCollection<'_> {
    GeoJsonCollection {
        kind: "FeatureCollection",
        features: features
            .features()
            .iter()
            .map(|f| match f {
                Feature::Rooftop(r) => rooftop(r),
                Feature::Panel(p) => panel(p),
                Feature::Coverage(c) => coverage(c),
            })
            .collect(),
    }
}

/// Convert a collection into a `serde_json` value.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if encoding fails.
pub fn to_geojson_value(features: &FeatureCollection) -> Result<serde_json::Value, ExportError> {
    Ok(serde_json::to_value(collection(features))?)
}

/// Render a collection as a GeoJSON document.
///
/// Serializing the same collection twice yields identical text.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if encoding fails.
pub fn to_geojson_string(
    features: &FeatureCollection,
    pretty: bool,
) -> Result<String, ExportError> {
    let document = collection(features);
    let text = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };
    log::debug!("encoded {} features ({} bytes)", document.features.len(), text.len());
    Ok(text)
}
