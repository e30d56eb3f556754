//! solarmap: turn per-tile rooftop and solar panel detections into
//! ward-level GeoJSON coverage.
//!
//! Scans a tile directory, reads each tile's precomputed detections from
//! its `.detections.json` sidecar, runs the pipeline over all tiles in
//! parallel, and writes a single GeoJSON feature collection. Optionally
//! writes an SVG preview and per-tile PNG overlays.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin solarmap -- [OPTIONS] <TILES_DIR>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use solarmap_io::{DiscoveredTile, SkippedTile, TileLayout};
use solarmap_pipeline::{
    ContourTracerKind, FlatEarth, PipelineConfig, RunOutput, RunSummary, TileFailure,
};

/// Rooftop solar adoption mapping from satellite tile detections.
///
/// Reads tiles named `<prefix>_<lat>_<lon>.png` (optionally grouped in one
/// sub-directory per ward) together with their detection sidecars, and
/// writes rooftops, panels and per-ward coverage as GeoJSON.
#[derive(Parser)]
#[command(name = "solarmap", version)]
struct Cli {
    /// Directory holding the tiles.
    tiles_dir: PathBuf,

    /// Directory mirroring the tile tree with detection sidecars
    /// (default: sidecars next to the tiles).
    #[arg(long)]
    detections_dir: Option<PathBuf>,

    /// GeoJSON output file.
    #[arg(long, short, default_value = "rooftops.geojson")]
    output: PathBuf,

    /// Tile directory layout.
    #[arg(long, value_enum, default_value_t = Layout::Auto)]
    layout: Layout,

    /// Ground sampling distance in meters per pixel.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_METERS_PER_PIXEL)]
    meters_per_pixel: f64,

    /// Degrees of latitude per meter.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DEGREES_PER_METER)]
    degrees_per_meter: f64,

    /// Minimum detector confidence for masks and panel boxes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence: f32,

    /// Minimum rooftop area in square pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_PIXEL_AREA)]
    min_pixel_area: f64,

    /// Minimum mapped polygon area in square degrees.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_GEO_AREA)]
    min_geo_area: f64,

    /// Mask pixels strictly above this value are rooftop.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MASK_THRESHOLD)]
    mask_threshold: u8,

    /// Contour tracing algorithm.
    #[arg(long, value_enum, default_value_t = Tracer::ExternalBorders)]
    contour_tracer: Tracer,

    /// Keep every traced boundary pixel instead of compressing straight runs.
    #[arg(long)]
    no_compress: bool,

    /// Emit one coverage feature for the whole run instead of one per ward.
    #[arg(long)]
    no_ward_grouping: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their default values.
    #[arg(long)]
    config_json: Option<String>,

    /// Write an SVG coverage preview to this file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write one PNG detection overlay per tile into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Worker threads (default: one per core).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    threads: Option<usize>,

    /// Pretty-print the GeoJSON output.
    #[arg(long)]
    pretty: bool,

    /// Print the run summary as JSON instead of a human-readable report.
    #[arg(long)]
    summary_json: bool,

    /// Log debug details (overridden by `RUST_LOG`).
    #[arg(long, short)]
    verbose: bool,
}

/// Tile directory layout selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Layout {
    /// Tiles directly in the directory, no wards.
    Flat,
    /// One sub-directory per ward.
    Wards,
    /// Wards if any sub-directory holds tiles, otherwise flat.
    Auto,
}

/// Contour tracing algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Tracer {
    /// Outermost region borders only.
    ExternalBorders,
}

const fn tracer_to_pipeline(tracer: Tracer) -> ContourTracerKind {
    match tracer {
        Tracer::ExternalBorders => ContourTracerKind::ExternalBorders,
    }
}

const fn layout_to_io(layout: Layout) -> TileLayout {
    match layout {
        Layout::Flat => TileLayout::Flat,
        Layout::Wards => TileLayout::Wards,
        Layout::Auto => TileLayout::Auto,
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json)
            .map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        meters_per_pixel: cli.meters_per_pixel,
        degrees_per_meter: cli.degrees_per_meter,
        confidence_threshold: cli.confidence,
        min_pixel_area: cli.min_pixel_area,
        min_geo_area: cli.min_geo_area,
        mask_threshold: cli.mask_threshold,
        compress_contours: !cli.no_compress,
        group_by_ward: !cli.no_ward_grouping,
        contour_tracer: tracer_to_pipeline(cli.contour_tracer),
    })
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Count tiles dropped during discovery as failed tiles of the run.
fn record_skipped(summary: &mut RunSummary, skipped: &[SkippedTile]) {
    summary.tiles_total += skipped.len();
    summary.failures.extend(skipped.iter().map(|s| TileFailure {
        tile_id: s
            .path
            .file_name()
            .map_or_else(|| s.path.display().to_string(), |n| n.to_string_lossy().into_owned()),
        ward: s.ward.clone(),
        reason: s.reason.clone(),
    }));
    summary
        .failures
        .sort_by(|a, b| (&a.ward, &a.tile_id).cmp(&(&b.ward, &b.tile_id)));
}

/// Optional previews are best effort: failures are logged, not fatal.
fn write_previews(
    cli: &Cli,
    tiles: &[DiscoveredTile],
    output: &RunOutput,
    config: &PipelineConfig,
) {
    if let Some(ref svg_path) = cli.svg {
        let style = solarmap_export::SvgStyle {
            title: cli.tiles_dir.file_name().map(|n| n.to_string_lossy().into_owned()),
            ..solarmap_export::SvgStyle::default()
        };
        if let Err(e) = solarmap_io::write_svg(svg_path, &output.collection, &style) {
            log::error!("{e}");
        }
    }

    if let Some(ref dir) = cli.overlay_dir
        && let Err(e) = solarmap_io::write_overlays(
            dir,
            tiles,
            &output.collection,
            &FlatEarth::from_config(config),
        )
    {
        log::error!("{e}");
    }
}

fn print_summary(summary: &RunSummary, as_json: bool) -> Result<(), String> {
    if as_json {
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", summary.report());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    config.validate().map_err(|e| e.to_string())?;
    log::debug!("config: {config:?}");

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| format!("Error configuring {threads} worker threads: {e}"))?;
    }

    let scan = solarmap_io::discover_tiles(&cli.tiles_dir, layout_to_io(cli.layout))
        .map_err(|e| e.to_string())?;
    log::info!(
        "found {} tiles in {} ({} layout, {} skipped)",
        scan.tiles.len(),
        cli.tiles_dir.display(),
        scan.layout,
        scan.skipped.len(),
    );

    let detector = solarmap_io::SidecarDetector::for_tiles(
        &scan.tiles,
        &cli.tiles_dir,
        cli.detections_dir.as_deref(),
    );

    let mut output =
        solarmap_pipeline::run(&scan.tiles, &detector, &config).map_err(|e| e.to_string())?;
    record_skipped(&mut output.summary, &scan.skipped);

    solarmap_io::write_geojson(&cli.output, &output.collection, cli.pretty)
        .map_err(|e| e.to_string())?;
    write_previews(cli, &scan.tiles, &output, &config);

    print_summary(&output.summary, cli.summary_json)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
