//! Output features and the append-only collection that holds them.

use geo::MultiPolygon;

use crate::aggregate::AdoptionStats;
use crate::types::GeoPolygon;

/// One detected rooftop.
#[derive(Debug, Clone, PartialEq)]
pub struct RooftopFeature {
    /// Rooftop footprint in `(lon, lat)`.
    pub geometry: GeoPolygon,
    /// Ward of the source tile, if known.
    pub ward: Option<String>,
    /// Identifier of the source tile.
    pub tile_id: String,
    /// Footprint area in square pixels, measured before mapping.
    pub pixel_area: f64,
    /// Whether any panel on the same tile intersects the footprint.
    pub has_solar: bool,
}

/// One detected panel box that sits on a rooftop.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelFeature {
    /// Panel quadrilateral in `(lon, lat)`.
    pub geometry: GeoPolygon,
    /// Ward of the source tile, if known.
    pub ward: Option<String>,
    /// Identifier of the tile the panel was detected on.
    pub belongs_to: String,
}

/// Whether a coverage feature summarises a ward or a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageKind {
    /// Union of the rooftops of one ward.
    WardOutline,
    /// Union of every rooftop in an ungrouped run.
    CoverageMask,
}

impl CoverageKind {
    /// Value of the `type` property.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WardOutline => "ward_outline",
            Self::CoverageMask => "coverage_mask",
        }
    }
}

/// Dissolved rooftop footprint of a group with its adoption counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageFeature {
    /// Union of every rooftop geometry in the group (possibly multi-part).
    pub geometry: MultiPolygon<f64>,
    /// Ward the group represents, `None` for a whole-run aggregate.
    pub ward: Option<String>,
    /// Ward outline or whole-run coverage mask.
    pub kind: CoverageKind,
    /// Rooftop counts behind the union.
    pub stats: AdoptionStats,
}

/// Any feature the pipeline emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// A rooftop footprint.
    Rooftop(RooftopFeature),
    /// A panel box matched to a rooftop.
    Panel(PanelFeature),
    /// A ward or run level dissolve.
    Coverage(CoverageFeature),
}

/// Ordered, append-only sequence of features.
///
/// Features can be pushed and read but never modified or removed once
/// appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    features: Vec<Feature>,
}

impl FeatureCollection {
    /// Create an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// Append a feature.
    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// All features in append order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate over rooftop features.
    pub fn rooftops(&self) -> impl Iterator<Item = &RooftopFeature> {
        self.features.iter().filter_map(|f| match f {
            Feature::Rooftop(r) => Some(r),
            _ => None,
        })
    }

    /// Iterate over panel features.
    pub fn panels(&self) -> impl Iterator<Item = &PanelFeature> {
        self.features.iter().filter_map(|f| match f {
            Feature::Panel(p) => Some(p),
            _ => None,
        })
    }

    /// Iterate over coverage features.
    pub fn coverages(&self) -> impl Iterator<Item = &CoverageFeature> {
        self.features.iter().filter_map(|f| match f {
            Feature::Coverage(c) => Some(c),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
