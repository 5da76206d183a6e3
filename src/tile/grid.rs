//! Grid set lookups needed by the XYZ path layout.

use std::collections::HashMap;

use crate::error::StorageError;

/// Answers how many tile rows a grid set has at a zoom level.
pub trait GridRegistry: Send + Sync {
    /// Number of tile rows of `gridset_id` at zoom level `zoom`.
    fn tiles_high(&self, gridset_id: &str, zoom: i32) -> Result<i64, StorageError>;
}

/// A quad-tree grid set: the tile count doubles per axis at each zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDefinition {
    pub tiles_wide_at_zero: i64,
    pub tiles_high_at_zero: i64,
    pub levels: i32,
}

impl GridDefinition {
    pub fn new(tiles_wide_at_zero: i64, tiles_high_at_zero: i64, levels: i32) -> Self {
        Self {
            tiles_wide_at_zero,
            tiles_high_at_zero,
            levels,
        }
    }

    pub fn tiles_high(&self, zoom: i32) -> Option<i64> {
        (0..self.levels)
            .contains(&zoom)
            .then(|| self.tiles_high_at_zero << zoom)
    }

    pub fn tiles_wide(&self, zoom: i32) -> Option<i64> {
        (0..self.levels)
            .contains(&zoom)
            .then(|| self.tiles_wide_at_zero << zoom)
    }
}

/// In-memory grid registry.
#[derive(Debug, Clone, Default)]
pub struct StaticGridRegistry {
    grids: HashMap<String, GridDefinition>,
}

impl StaticGridRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the world grid sets `EPSG:4326` (2x1 tiles at zoom 0)
    /// and `EPSG:900913` / `EPSG:3857` (1x1 tiles at zoom 0).
    pub fn with_world_grids() -> Self {
        Self::new()
            .register("EPSG:4326", GridDefinition::new(2, 1, 22))
            .register("EPSG:900913", GridDefinition::new(1, 1, 31))
            .register("EPSG:3857", GridDefinition::new(1, 1, 31))
    }

    pub fn register(mut self, gridset_id: impl Into<String>, grid: GridDefinition) -> Self {
        self.grids.insert(gridset_id.into(), grid);
        self
    }

    pub fn get(&self, gridset_id: &str) -> Option<&GridDefinition> {
        self.grids.get(gridset_id)
    }
}

impl GridRegistry for StaticGridRegistry {
    fn tiles_high(&self, gridset_id: &str, zoom: i32) -> Result<i64, StorageError> {
        self.grids
            .get(gridset_id)
            .and_then(|grid| grid.tiles_high(zoom))
            .ok_or_else(|| StorageError::UnknownGrid {
                gridset_id: gridset_id.to_string(),
                zoom,
            })
    }
}
