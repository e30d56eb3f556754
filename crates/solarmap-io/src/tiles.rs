//! Tile discovery and file name parsing.
//!
//! Tiles are PNG files whose stem ends in `_<lat>_<lon>`, e.g.
//! `tile_12.9716_77.5946.png`. A tile directory is either flat (every
//! tile directly inside it) or holds one sub-directory per ward.
//!
//! Discovery never aborts on a bad tile: unparseable names and
//! unreadable image headers are returned as [`SkippedTile`]s. Only the
//! header is read here; pixels are decoded when the engine loads the
//! tile.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use solarmap_pipeline::{Dimensions, GeoCenter, PipelineError, Tile, TileSource};

use crate::IoError;

/// Why a tile's center could not be read from its file name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileNameError {
    /// The stem has fewer than two underscore-separated tokens.
    #[error("{name:?} does not end in _<lat>_<lon>")]
    MissingCoordinates {
        /// File name that was parsed.
        name: String,
    },

    /// A coordinate token is not a finite number.
    #[error("{name:?}: {token:?} is not a valid coordinate")]
    InvalidNumber {
        /// File name that was parsed.
        name: String,
        /// Token that failed to parse.
        token: String,
    },
}

/// Read `(lat, lon)` from the last two underscore-separated tokens of the
/// file stem.
///
/// # Errors
///
/// Returns [`TileNameError`] if the tokens are missing or not finite numbers.
///
/// # Examples
///
/// ```
/// use solarmap_io::parse_tile_center;
///
/// let center = parse_tile_center("tile_12.9716_77.5946.png").unwrap();
/// assert_eq!(center.lat, 12.9716);
/// assert_eq!(center.lon, 77.5946);
/// ```
pub fn parse_tile_center(file_name: &str) -> Result<GeoCenter, TileNameError> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let mut tokens = stem.rsplit('_');
    let (Some(lon), Some(lat)) = (tokens.next(), tokens.next()) else {
        return Err(TileNameError::MissingCoordinates {
            name: file_name.to_owned(),
        });
    };

    let number = |token: &str| {
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| TileNameError::InvalidNumber {
                name: file_name.to_owned(),
                token: token.to_owned(),
            })
    };
    Ok(GeoCenter::new(number(lat)?, number(lon)?))
}

/// How tiles are arranged under the tile root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileLayout {
    /// Tiles directly under the root, no wards.
    Flat,
    /// One sub-directory per ward, tiles inside.
    Wards,
    /// `Wards` if any sub-directory holds tiles, otherwise `Flat`.
    #[default]
    Auto,
}

impl fmt::Display for TileLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flat => "flat",
            Self::Wards => "wards",
            Self::Auto => "auto",
        })
    }
}

/// A tile found on disk, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTile {
    /// File name of the tile.
    pub id: String,
    /// Parent directory name in the ward layout.
    pub ward: Option<String>,
    /// Center parsed from the file name.
    pub center: GeoCenter,
    /// Size read from the image header.
    pub dimensions: Dimensions,
    /// Path of the tile image.
    pub path: PathBuf,
}

impl TileSource for DiscoveredTile {
    fn id(&self) -> &str {
        &self.id
    }

    fn ward(&self) -> Option<&str> {
        self.ward.as_deref()
    }

    fn center(&self) -> GeoCenter {
        self.center
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn load(&self) -> Result<Cow<'_, Tile>, PipelineError> {
        let image = image::open(&self.path).map_err(|e| PipelineError::TileLoad {
            tile_id: self.id.clone(),
            reason: format!("cannot decode {}: {e}", self.path.display()),
        })?;
        let tile = Tile::new(self.id.clone(), self.center, image.to_rgb8());
        Ok(Cow::Owned(match &self.ward {
            Some(ward) => tile.with_ward(ward.clone()),
            None => tile,
        }))
    }
}

/// A tile file that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTile {
    /// Path of the tile image.
    pub path: PathBuf,
    /// Ward the tile would have belonged to.
    pub ward: Option<String>,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of scanning a tile directory.
#[derive(Debug, Clone, Default)]
pub struct TileScan {
    /// Usable tiles, sorted by path.
    pub tiles: Vec<DiscoveredTile>,
    /// Tiles that were skipped, sorted by path.
    pub skipped: Vec<SkippedTile>,
    /// The layout that was actually used (`Auto` resolved).
    pub layout: TileLayout,
}

/// PNG files are tiles unless their stem carries a non-numeric inner
/// extension (`X.roof0.png` is a mask belonging to tile `X.png`).
fn is_tile(path: &Path) -> bool {
    let is_png = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));
    let auxiliary = path
        .file_stem()
        .and_then(|s| Path::new(s).extension())
        .and_then(|e| e.to_str())
        .is_some_and(|inner| !inner.contains('_') && inner.parse::<f64>().is_err());
    is_png && !auxiliary
}

/// PNG files exactly `depth` levels below `root`, sorted by path.
fn tile_paths(root: &Path, depth: usize) -> Result<Vec<PathBuf>, IoError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| IoError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_tile(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn inspect_tile(path: &Path, ward: Option<&str>) -> Result<DiscoveredTile, String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| String::from("file name is not valid UTF-8"))?;
    let center = parse_tile_center(name).map_err(|e| e.to_string())?;
    let (width, height) =
        image::image_dimensions(path).map_err(|e| format!("cannot decode image header: {e}"))?;

    Ok(DiscoveredTile {
        id: name.to_owned(),
        ward: ward.map(str::to_owned),
        center,
        dimensions: Dimensions { width, height },
        path: path.to_path_buf(),
    })
}

/// Find every tile under `root` and read its header.
///
/// With [`TileLayout::Wards`] the ward of each tile is the name of its
/// parent directory.
///
/// # Errors
///
/// Returns [`IoError::NotADirectory`] if `root` is not a directory, or
/// [`IoError::Walk`] if it cannot be listed. Individual bad tiles are
/// reported in [`TileScan::skipped`] instead.
pub fn discover_tiles(root: &Path, layout: TileLayout) -> Result<TileScan, IoError> {
    if !root.is_dir() {
        return Err(IoError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let (layout, paths) = match layout {
        TileLayout::Flat => (TileLayout::Flat, tile_paths(root, 1)?),
        TileLayout::Wards => (TileLayout::Wards, tile_paths(root, 2)?),
        TileLayout::Auto => {
            let nested = tile_paths(root, 2)?;
            if nested.is_empty() {
                (TileLayout::Flat, tile_paths(root, 1)?)
            } else {
                (TileLayout::Wards, nested)
            }
        }
    };
    log::debug!("{}: {} candidate tiles ({layout} layout)", root.display(), paths.len());

    let mut scan = TileScan {
        layout,
        ..TileScan::default()
    };
    for path in paths {
        let ward = if layout == TileLayout::Wards {
            path.parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
        } else {
            None
        };
        match inspect_tile(&path, ward) {
            Ok(tile) => scan.tiles.push(tile),
            Err(reason) => {
                log::warn!("skipping {}: {reason}", path.display());
                let ward = ward.map(str::to_owned);
                scan.skipped.push(SkippedTile { path, ward, reason });
            }
        }
    }

    Ok(scan)
}
