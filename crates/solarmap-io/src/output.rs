//! Output writing.
//!
//! Each writer renders with `solarmap-export` and writes the whole file
//! in one go, creating parent directories as needed.

use std::path::{Path, PathBuf};

use solarmap_export::{OverlayLayers, OverlayStyle, SvgStyle, render_overlay};
use solarmap_pipeline::{FeatureCollection, Projection, TileSource};

use crate::IoError;

fn ensure_parent(path: &Path) -> Result<(), IoError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| IoError::Write {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Write `contents` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`IoError::Write`] if the directory or file cannot be written.
pub fn write_text(path: &Path, contents: &str) -> Result<(), IoError> {
    ensure_parent(path)?;
    std::fs::write(path, contents).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `features` as GeoJSON and return the number of features written.
///
/// # Errors
///
/// Returns [`IoError::Export`] if serialization fails or
/// [`IoError::Write`] if the file cannot be written.
pub fn write_geojson(
    path: &Path,
    features: &FeatureCollection,
    pretty: bool,
) -> Result<usize, IoError> {
    let text = solarmap_export::to_geojson_string(features, pretty)?;
    write_text(path, &text)?;
    log::info!("wrote {} features to {}", features.len(), path.display());
    Ok(features.len())
}

/// Write an SVG preview of `features`.
///
/// # Errors
///
/// Returns [`IoError::Write`] if the file cannot be written.
pub fn write_svg(
    path: &Path,
    features: &FeatureCollection,
    style: &SvgStyle,
) -> Result<(), IoError> {
    write_text(path, &solarmap_export::to_svg(features, style))?;
    log::info!("wrote SVG preview to {}", path.display());
    Ok(())
}

/// Overlay file for a tile: `<dir>/[<ward>/]<stem>.overlay.png`.
fn overlay_path(dir: &Path, tile_id: &str, ward: Option<&str>) -> PathBuf {
    let stem = Path::new(tile_id)
        .file_stem()
        .map_or_else(|| tile_id.to_owned(), |s| s.to_string_lossy().into_owned());
    let dir = match ward {
        Some(ward) => dir.join(ward),
        None => dir.to_path_buf(),
    };
    dir.join(format!("{stem}.overlay.png"))
}

/// Write one PNG overlay per tile that has at least one feature, and
/// return the number written.
///
/// Tiles are decoded one at a time, and only when they have something
/// to draw. Tiles whose center cannot be mapped or whose raster cannot
/// be loaded are skipped.
///
/// # Errors
///
/// Returns [`IoError::Write`] or [`IoError::Image`] for the first overlay
/// that cannot be written.
pub fn write_overlays<S: TileSource, P: Projection + ?Sized>(
    dir: &Path,
    tiles: &[S],
    features: &FeatureCollection,
    projection: &P,
) -> Result<usize, IoError> {
    let style = OverlayStyle::default();
    let mut written = 0;
    for tile_source in tiles {
        let (id, ward) = (tile_source.id(), tile_source.ward());
        let Ok(mapper) = projection.mapper(tile_source.center(), tile_source.dimensions()) else {
            continue;
        };
        let layers = OverlayLayers::for_tile(features, id, ward, &mapper);
        if layers.is_empty() {
            continue;
        }
        let tile = match tile_source.load() {
            Ok(tile) => tile,
            Err(e) => {
                log::warn!("{id}: no overlay: {e}");
                continue;
            }
        };

        let path = overlay_path(dir, id, ward);
        ensure_parent(&path)?;
        render_overlay(&tile.image, &layers, &style)
            .save(&path)
            .map_err(|source| IoError::Image {
                path: path.clone(),
                source,
            })?;
        log::debug!("wrote overlay {}", path.display());
        written += 1;
    }
    log::info!("wrote {written} overlays to {}", dir.display());
    Ok(written)
}
