//! SVG coverage preview.
//!
//! Draws a [`FeatureCollection`] in an equirectangular projection so a
//! run can be checked at a glance without a GIS tool. Longitude is scaled
//! by `cos(mean latitude)`, which keeps rooftops square at city scale.
//!
//! Rooftops are filled by adoption (green with solar, red without),
//! panels are outlined, and coverage outlines are dashed. Built with the
//! [`svg`] crate, which handles escaping and path data formatting.

use geo::{LineString, Polygon};
use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Group, Path, Title};

use solarmap_pipeline::{Feature, FeatureCollection};

/// Colours and sizing for [`to_svg`].
#[derive(Debug, Clone, PartialEq)]
pub struct SvgStyle {
    /// Document width in user units; height follows the data aspect ratio.
    pub width: u32,
    /// Margin around the drawing in user units.
    pub margin: f64,
    /// Fill for rooftops with solar.
    pub with_solar_fill: String,
    /// Fill for rooftops without solar.
    pub without_solar_fill: String,
    /// Outline colour for panels.
    pub panel_stroke: String,
    /// Outline colour for coverage features.
    pub coverage_stroke: String,
    /// Rooftop fill opacity in `[0, 1]`.
    pub fill_opacity: f64,
    /// Optional document `<title>`.
    pub title: Option<String>,
}

impl Default for SvgStyle {
    fn default() -> Self {
        Self {
            width: 1024,
            margin: 8.0,
            with_solar_fill: String::from("#2e7d32"),
            without_solar_fill: String::from("#c62828"),
            panel_stroke: String::from("#fbc02d"),
            coverage_stroke: String::from("#1565c0"),
            fill_opacity: 0.6,
            title: None,
        }
    }
}

/// Maps `(lon, lat)` onto document coordinates.
#[derive(Debug, Clone, Copy)]
struct Viewport {
    min_lon: f64,
    max_lat: f64,
    lon_scale: f64,
    scale: f64,
    margin: f64,
}

impl Viewport {
    fn fit(features: &FeatureCollection, style: &SvgStyle) -> Option<(Self, f64)> {
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        for polygon in polygons(features) {
            for c in polygon.exterior().coords() {
                min_lon = min_lon.min(c.x);
                max_lon = max_lon.max(c.x);
                min_lat = min_lat.min(c.y);
                max_lat = max_lat.max(c.y);
            }
        }
        if !min_lon.is_finite() || !max_lat.is_finite() {
            return None;
        }

        let lon_scale = ((min_lat + max_lat) / 2.0).to_radians().cos();
        let span_x = ((max_lon - min_lon) * lon_scale).max(f64::EPSILON);
        let span_y = (max_lat - min_lat).max(f64::EPSILON);
        let drawable = (f64::from(style.width) - 2.0 * style.margin).max(1.0);
        let scale = drawable / span_x;
        let height = span_y.mul_add(scale, 2.0 * style.margin);

        Some((
            Self {
                min_lon,
                max_lat,
                lon_scale,
                scale,
                margin: style.margin,
            },
            height,
        ))
    }

    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            ((lon - self.min_lon) * self.lon_scale).mul_add(self.scale, self.margin),
            (self.max_lat - lat).mul_add(self.scale, self.margin),
        )
    }

    fn ring_data(&self, ring: &LineString<f64>, data: Data) -> Data {
        let mut coords = ring.coords();
        let Some(first) = coords.next() else {
            return data;
        };
        let mut data = data.move_to(self.project(first.x, first.y));
        for c in coords {
            data = data.line_to(self.project(c.x, c.y));
        }
        data.close()
    }

    fn polygon_data(&self, polygon: &Polygon<f64>, data: Data) -> Data {
        let data = self.ring_data(polygon.exterior(), data);
        polygon
            .interiors()
            .iter()
            .fold(data, |d, ring| self.ring_data(ring, d))
    }
}

fn polygons(features: &FeatureCollection) -> impl Iterator<Item = &Polygon<f64>> {
    features.features().iter().flat_map(|f| match f {
        Feature::Rooftop(r) => std::slice::from_ref(r.geometry.polygon()),
        Feature::Panel(p) => std::slice::from_ref(p.geometry.polygon()),
        Feature::Coverage(c) => c.geometry.0.as_slice(),
    })
}

/// Render a preview of `features`.
///
/// An empty collection yields an empty square document.
///
/// # Examples
///
/// ```
/// use solarmap_export::{SvgStyle, to_svg};
/// use solarmap_pipeline::FeatureCollection;
///
/// let svg = to_svg(&FeatureCollection::new(), &SvgStyle::default());
/// assert!(svg.contains("<svg"));
/// ```
#[must_use]
pub fn to_svg(features: &FeatureCollection, style: &SvgStyle) -> String {
    let Some((viewport, height)) = Viewport::fit(features, style) else {
        let doc = Document::new()
            .set("width", style.width)
            .set("height", style.width)
            .set("viewBox", (0, 0, style.width, style.width));
        return format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n");
    };

    let mut doc = Document::new()
        .set("width", style.width)
        .set("height", height)
        .set("viewBox", (0.0, 0.0, f64::from(style.width), height));
    if let Some(title) = &style.title {
        doc = doc.add(Title::new(title.as_str()));
    }

    let mut rooftops = Group::new().set("id", "rooftops").set("stroke", "none");
    let mut panels = Group::new()
        .set("id", "panels")
        .set("fill", "none")
        .set("stroke", style.panel_stroke.as_str())
        .set("stroke-width", 1);
    let mut coverage = Group::new()
        .set("id", "coverage")
        .set("fill", "none")
        .set("stroke", style.coverage_stroke.as_str())
        .set("stroke-width", 1.5)
        .set("stroke-dasharray", "6 3");

    for feature in features {
        match feature {
            Feature::Rooftop(r) => {
                let fill = if r.has_solar {
                    &style.with_solar_fill
                } else {
                    &style.without_solar_fill
                };
                rooftops = rooftops.add(
                    Path::new()
                        .set("d", viewport.polygon_data(r.geometry.polygon(), Data::new()))
                        .set("fill", fill.as_str())
                        .set("fill-opacity", style.fill_opacity),
                );
            }
            Feature::Panel(p) => {
                panels = panels.add(
                    Path::new().set("d", viewport.polygon_data(p.geometry.polygon(), Data::new())),
                );
            }
            Feature::Coverage(c) => {
                let data = c
                    .geometry
                    .0
                    .iter()
                    .fold(Data::new(), |d, part| viewport.polygon_data(part, d));
                let mut path = Path::new().set("d", data).set("fill-rule", "evenodd");
                if let Some(ward) = &c.ward {
                    path = path.set("data-ward", ward.as_str());
                }
                coverage = coverage.add(path);
            }
        }
    }

    doc = doc.add(coverage).add(rooftops).add(panels);

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
