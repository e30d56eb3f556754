//! Whole-run engine: tiles in parallel, then the per-group barrier.
//!
//! Tiles share no mutable state, so each runs as its own rayon task
//! (loading, detection, extraction, mapping, association). Once every
//! tile has finished, outcomes are grouped by ward and sorted by
//! `(ward, tile id)`, and each group is dissolved. Output order therefore does not depend on
//! thread scheduling.
//!
//! Failures stay with the tile that caused them. A run only fails as a
//! whole when the configuration itself is invalid.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::aggregate::aggregate_group;
use crate::detect::{Detections, Detector};
use crate::diagnostics::{RunSummary, TileFailure};
use crate::emit::{TileFeatures, emit_tile};
use crate::feature::{Feature, FeatureCollection};
use crate::mapping::{FlatEarth, Projection};
use crate::source::TileSource;
use crate::types::{PipelineConfig, PipelineError, Tile};

/// What happened to one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutcome {
    /// Rooftop masks were found and turned into features (possibly zero
    /// features, when every candidate was dropped).
    Completed(TileFeatures),
    /// The detector returned no rooftop masks.
    NoRooftops {
        /// Identifier of the tile.
        tile_id: String,
    },
    /// The tile could not be processed.
    Failed(TileFailure),
}

/// Features plus diagnostics for a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// Rooftops and panels tile by tile, each group followed by its coverage.
    pub collection: FeatureCollection,
    /// Counts and failures.
    pub summary: RunSummary,
}

/// Process one tile end to end.
///
/// Never panics and never returns an error: detector and projection
/// failures become [`TileOutcome::Failed`].
pub fn process_tile<D, P>(
    tile: &Tile,
    detector: &D,
    projection: &P,
    config: &PipelineConfig,
) -> TileOutcome
where
    D: Detector + ?Sized,
    P: Projection + ?Sized,
{
    let dimensions = tile.dimensions();
    let mapper = match projection.mapper(tile.center, dimensions) {
        Ok(mapper) => mapper,
        Err(e) => return failed(&tile.id, tile.ward.as_deref(), &e),
    };

    let rooftop_masks = match detector.detect_rooftops(tile, config.confidence_threshold) {
        Ok(masks) => masks,
        Err(e) => {
            return failed(&tile.id, tile.ward.as_deref(), &PipelineError::from(e));
        }
    };
    if rooftop_masks.is_empty() {
        log::debug!("{}: no rooftop masks", tile.id);
        return TileOutcome::NoRooftops {
            tile_id: tile.id.clone(),
        };
    }

    let panel_boxes = match detector.detect_panels(tile, config.confidence_threshold) {
        Ok(boxes) => boxes,
        Err(e) => {
            return failed(&tile.id, tile.ward.as_deref(), &PipelineError::from(e));
        }
    };

    let detections = Detections {
        rooftop_masks,
        panel_boxes,
    };
    let features = emit_tile(
        &tile.id,
        tile.ward.as_deref(),
        dimensions,
        &detections,
        &mapper,
        config,
    );
    log::debug!(
        "{}: {} rooftops, {} panels, {} dropped",
        tile.id,
        features.entries.len(),
        features.panel_count(),
        features.dropped.total(),
    );
    TileOutcome::Completed(features)
}

/// Load one tile from its source and process it.
///
/// The decoded raster lives only for the duration of this call.
pub fn process_source<S, D, P>(
    source: &S,
    detector: &D,
    projection: &P,
    config: &PipelineConfig,
) -> TileOutcome
where
    S: TileSource + ?Sized,
    D: Detector + ?Sized,
    P: Projection + ?Sized,
{
    match source.load() {
        Ok(tile) => process_tile(&tile, detector, projection, config),
        Err(e) => failed(source.id(), source.ward(), &e),
    }
}

fn failed(tile_id: &str, ward: Option<&str>, error: &PipelineError) -> TileOutcome {
    log::warn!("{tile_id}: skipping tile: {error}");
    TileOutcome::Failed(TileFailure {
        tile_id: tile_id.to_owned(),
        ward: ward.map(str::to_owned),
        reason: error.to_string(),
    })
}

/// Run the pipeline over `tiles` with the flat-earth projection from `config`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Tile-level problems are reported in [`RunSummary::failures`] instead.
pub fn run<S, D>(
    tiles: &[S],
    detector: &D,
    config: &PipelineConfig,
) -> Result<RunOutput, PipelineError>
where
    S: TileSource,
    D: Detector + ?Sized,
{
    run_with_projection(tiles, detector, &FlatEarth::from_config(config), config)
}

/// Run the pipeline over `tiles` with a caller-supplied projection.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
pub fn run_with_projection<S, D, P>(
    tiles: &[S],
    detector: &D,
    projection: &P,
    config: &PipelineConfig,
) -> Result<RunOutput, PipelineError>
where
    S: TileSource,
    D: Detector + ?Sized,
    P: Projection + ?Sized,
{
    config.validate()?;

    let outcomes: Vec<TileOutcome> = tiles
        .par_iter()
        .map(|tile| process_source(tile, detector, projection, config))
        .collect();

    let mut summary = RunSummary {
        tiles_total: tiles.len(),
        ..RunSummary::default()
    };
    let mut groups: BTreeMap<Option<String>, Vec<TileFeatures>> = BTreeMap::new();

    for outcome in outcomes {
        match outcome {
            TileOutcome::Completed(features) => {
                summary.tiles_with_rooftops += 1;
                summary.dropped.merge(&features.dropped);
                let key = if config.group_by_ward {
                    features.ward.clone()
                } else {
                    None
                };
                groups.entry(key).or_default().push(features);
            }
            TileOutcome::NoRooftops { .. } => summary.tiles_without_rooftops += 1,
            TileOutcome::Failed(failure) => summary.failures.push(failure),
        }
    }
    summary
        .failures
        .sort_by(|a, b| (&a.ward, &a.tile_id).cmp(&(&b.ward, &b.tile_id)));

    let mut collection = FeatureCollection::new();
    for (ward, mut group) in groups {
        group.sort_by(|a, b| (&a.ward, &a.tile_id).cmp(&(&b.ward, &b.tile_id)));

        let group_start = collection.len();
        for tile in group {
            for entry in tile.entries {
                summary.rooftops += 1;
                summary.rooftops_with_solar += usize::from(entry.rooftop.has_solar);
                summary.panels += entry.panels.len();
                collection.push(Feature::Rooftop(entry.rooftop));
                for panel in entry.panels {
                    collection.push(Feature::Panel(panel));
                }
            }
        }

        let group_rooftops = collection.features()[group_start..]
            .iter()
            .filter_map(|f| match f {
                Feature::Rooftop(r) => Some(r),
                _ => None,
            });
        if let Some(coverage) = aggregate_group(ward.as_deref(), group_rooftops) {
            summary.coverage_features += 1;
            collection.push(Feature::Coverage(coverage));
        }
    }

    log::info!(
        "processed {} tiles: {} rooftops ({} with solar), {} panels, {} failed",
        summary.tiles_total,
        summary.rooftops,
        summary.rooftops_with_solar,
        summary.panels,
        summary.failures.len(),
    );

    Ok(RunOutput {
        collection,
        summary,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::detect::{DetectError, InMemoryDetector, ScoredMask};
    use crate::types::{GeoCenter, PanelBox, RgbImage};

    fn tile(id: &str, ward: Option<&str>) -> Tile {
        let t = Tile::new(id, GeoCenter::new(12.97, 77.59), RgbImage::new(128, 128));
        match ward {
            Some(w) => t.with_ward(w),
            None => t,
        }
    }

    fn block_mask(x0: u32, y0: u32, x1: u32, y1: u32) -> ScoredMask {
        ScoredMask {
            mask: GrayImage::from_fn(128, 128, |x, y| {
                if (x0..=x1).contains(&x) && (y0..=y1).contains(&y) {
                    image::Luma([255])
                } else {
                    image::Luma([0])
                }
            }),
            confidence: 0.9,
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect_rooftops(&self, tile: &Tile, _: f32) -> Result<Vec<GrayImage>, DetectError> {
            Err(DetectError::Unavailable {
                tile_id: tile.id.clone(),
                reason: String::from("model offline"),
            })
        }

        fn detect_panels(&self, _: &Tile, _: f32) -> Result<Vec<PanelBox>, DetectError> {
            Ok(vec![])
        }
    }

    #[test]
    fn invalid_config_aborts_the_run() {
        let config = PipelineConfig {
            degrees_per_meter: -1.0,
            ..PipelineConfig::default()
        };
        let result = run::<Tile, _>(&[], &InMemoryDetector::new(), &config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn empty_run_produces_empty_collection() {
        let output =
            run::<Tile, _>(&[], &InMemoryDetector::new(), &PipelineConfig::default()).unwrap();
        assert!(output.collection.is_empty());
        assert_eq!(output.summary, RunSummary::default());
    }

    #[test]
    fn failing_detector_is_tile_scoped() {
        let tiles = [tile("a.png", None), tile("b.png", None)];
        let output = run(&tiles, &FailingDetector, &PipelineConfig::default()).unwrap();
        assert!(output.collection.is_empty());
        assert_eq!(output.summary.failures.len(), 2);
        assert!(output.summary.failures[0].reason.contains("model offline"));
    }

    #[test]
    fn polar_tile_fails_alone() {
        let mut detector = InMemoryDetector::new();
        detector.insert("ok.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        detector.insert("pole.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        let mut pole = tile("pole.png", None);
        pole.center = GeoCenter::new(90.0, 0.0);

        let output = run(
            &[tile("ok.png", None), pole],
            &detector,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(output.summary.failures.len(), 1);
        assert_eq!(output.summary.failures[0].tile_id, "pole.png");
        assert_eq!(output.collection.rooftops().count(), 1);
        assert_eq!(output.collection.coverages().count(), 1);
    }

    struct Unreadable;

    impl TileSource for Unreadable {
        fn id(&self) -> &str {
            "gone.png"
        }

        fn ward(&self) -> Option<&str> {
            Some("w")
        }

        fn center(&self) -> GeoCenter {
            GeoCenter::new(12.97, 77.59)
        }

        fn dimensions(&self) -> crate::types::Dimensions {
            crate::types::Dimensions {
                width: 128,
                height: 128,
            }
        }

        fn load(&self) -> Result<std::borrow::Cow<'_, Tile>, PipelineError> {
            Err(PipelineError::TileLoad {
                tile_id: String::from("gone.png"),
                reason: String::from("truncated file"),
            })
        }
    }

    #[test]
    fn unreadable_tile_is_a_tile_failure() {
        let output =
            run(&[Unreadable], &InMemoryDetector::new(), &PipelineConfig::default()).unwrap();
        assert!(output.collection.is_empty());
        assert_eq!(output.summary.tiles_total, 1);
        let failure = &output.summary.failures[0];
        assert_eq!(failure.tile_id, "gone.png");
        assert_eq!(failure.ward.as_deref(), Some("w"));
        assert!(failure.reason.contains("truncated file"));
    }

    #[test]
    fn tile_without_masks_contributes_nothing() {
        let mut detector = InMemoryDetector::new();
        detector.insert("empty.png", vec![], vec![PanelBox::new(1.0, 1.0, 9.0, 9.0, 0.9)]);
        let output =
            run(&[tile("empty.png", None)], &detector, &PipelineConfig::default()).unwrap();
        assert!(output.collection.is_empty());
        assert_eq!(output.summary.tiles_without_rooftops, 1);
        assert_eq!(output.summary.coverage_features, 0);
    }

    #[test]
    fn groups_by_ward_with_coverage_after_each_group() {
        let mut detector = InMemoryDetector::new();
        detector.insert("a2.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        detector.insert("a1.png", vec![block_mask(60, 60, 90, 90)], vec![]);
        detector.insert("b1.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        let tiles = [
            tile("b1.png", Some("beta")),
            tile("a2.png", Some("alpha")),
            tile("a1.png", Some("alpha")),
        ];

        let output = run(&tiles, &detector, &PipelineConfig::default()).unwrap();
        let kinds: Vec<String> = output
            .collection
            .features()
            .iter()
            .map(|f| match f {
                Feature::Rooftop(r) => format!("roof:{}", r.tile_id),
                Feature::Panel(p) => format!("panel:{}", p.belongs_to),
                Feature::Coverage(c) => format!("cover:{}", c.ward.as_deref().unwrap_or("-")),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "roof:a1.png",
                "roof:a2.png",
                "cover:alpha",
                "roof:b1.png",
                "cover:beta",
            ]
        );
    }

    #[test]
    fn ungrouped_run_emits_single_coverage_mask() {
        let mut detector = InMemoryDetector::new();
        detector.insert("a.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        detector.insert("b.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        let tiles = [tile("a.png", Some("alpha")), tile("b.png", Some("beta"))];
        let config = PipelineConfig {
            group_by_ward: false,
            ..PipelineConfig::default()
        };

        let output = run(&tiles, &detector, &config).unwrap();
        let coverages: Vec<_> = output.collection.coverages().collect();
        assert_eq!(coverages.len(), 1);
        assert!(coverages[0].ward.is_none());
        assert_eq!(coverages[0].stats.total_rooftops, 2);
        // Rooftops keep their ward even when coverage is not grouped.
        assert!(output.collection.rooftops().all(|r| r.ward.is_some()));
    }

    #[test]
    fn ungrouped_tiles_sharing_an_id_sort_by_ward() {
        let mut detector = InMemoryDetector::new();
        detector.insert("t.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        let config = PipelineConfig {
            group_by_ward: false,
            ..PipelineConfig::default()
        };

        for tiles in [
            [tile("t.png", Some("b")), tile("t.png", Some("a"))],
            [tile("t.png", Some("a")), tile("t.png", Some("b"))],
        ] {
            let output = run(&tiles, &detector, &config).unwrap();
            let wards: Vec<Option<&str>> = output
                .collection
                .rooftops()
                .map(|r| r.ward.as_deref())
                .collect();
            assert_eq!(wards, vec![Some("a"), Some("b")]);
        }
    }

    #[test]
    fn rooftops_invalid_after_mapping_leave_no_coverage() {
        let mut detector = InMemoryDetector::new();
        detector.insert("tiny.png", vec![block_mask(10, 10, 40, 40)], vec![]);
        let config = PipelineConfig {
            min_geo_area: 1e-6,
            ..PipelineConfig::default()
        };

        let output = run(&[tile("tiny.png", Some("w"))], &detector, &config).unwrap();
        assert!(output.collection.is_empty());
        assert_eq!(output.summary.tiles_with_rooftops, 1);
        assert_eq!(output.summary.dropped.after_mapping, 1);
        assert_eq!(output.summary.coverage_features, 0);
    }

    #[test]
    fn counts_match_collection() {
        let mut detector = InMemoryDetector::new();
        detector.insert(
            "a.png",
            vec![block_mask(10, 10, 40, 40), block_mask(60, 60, 100, 100)],
            vec![PanelBox::new(20.0, 20.0, 30.0, 30.0, 0.8)],
        );
        let output = run(&[tile("a.png", None)], &detector, &PipelineConfig::default()).unwrap();
        let summary = &output.summary;
        assert_eq!(summary.rooftops, 2);
        assert_eq!(summary.rooftops_with_solar, 1);
        assert_eq!(summary.panels, 1);
        let coverage = output.collection.coverages().next().unwrap();
        assert_eq!(
            coverage.stats.total_rooftops,
            coverage.stats.with_solar + coverage.stats.without_solar
        );
        assert_eq!(coverage.stats.with_solar, 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut detector = InMemoryDetector::new();
        for i in 0..6 {
            detector.insert(
                format!("t{i}.png"),
                vec![block_mask(10, 10, 40 + i, 40), block_mask(50, 50, 90, 90 - i)],
                vec![PanelBox::new(55.0, 55.0, 70.0, 70.0, 0.9)],
            );
        }
        let tiles: Vec<Tile> = (0..6).map(|i| tile(&format!("t{i}.png"), Some("w"))).collect();
        let first = run(&tiles, &detector, &PipelineConfig::default()).unwrap();
        let second = run(&tiles, &detector, &PipelineConfig::default()).unwrap();
        assert_eq!(first, second);
    }
}
