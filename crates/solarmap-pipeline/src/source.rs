//! Tile sources: where the engine gets each tile's raster from.
//!
//! The engine reads a tile's identity, center and size up front and only
//! asks for the decoded raster inside that tile's own task, so a run over
//! thousands of tiles on disk holds about one raster per worker thread.

use std::borrow::Cow;

use crate::types::{Dimensions, GeoCenter, PipelineError, Tile};

/// A tile whose raster can be loaded on demand.
///
/// [`Tile`] is its own source and loads by borrowing itself.
pub trait TileSource: Sync {
    /// Stable identifier, usually the tile's file name.
    fn id(&self) -> &str;

    /// Ward the tile belongs to, if any.
    fn ward(&self) -> Option<&str>;

    /// Geographic center of the tile.
    fn center(&self) -> GeoCenter;

    /// Pixel dimensions of the tile raster.
    fn dimensions(&self) -> Dimensions;

    /// Produce the tile with its decoded raster.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TileLoad`] if the raster cannot be read.
    fn load(&self) -> Result<Cow<'_, Tile>, PipelineError>;
}

impl TileSource for Tile {
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
        Self::dimensions(self)
    }

    fn load(&self) -> Result<Cow<'_, Tile>, PipelineError> {
        Ok(Cow::Borrowed(self))
    }
}
