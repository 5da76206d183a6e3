//! Tile ranges used by bulk delete and enumeration.

use std::collections::BTreeMap;

use crate::error::StorageError;

// =============================================================================
// Range Bounds
// =============================================================================

/// Inclusive rectangle of tile coordinates at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeBounds {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl RangeBounds {
    pub fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    pub fn contains_x(&self, x: i64) -> bool {
        self.min_x <= x && x <= self.max_x
    }

    pub fn intersects(&self, other: &RangeBounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

// =============================================================================
// Tile Range
// =============================================================================

/// A set of tiles of one layer, grid set, format and parameterization.
///
/// `zoom_start == zoom_stop == -1` selects every zoom level. A zoom level with
/// no rectangle registered through [`TileRange::with_bounds`] matches in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRange {
    layer_name: String,
    gridset_id: String,
    zoom_start: i32,
    zoom_stop: i32,
    bounds: BTreeMap<i32, RangeBounds>,
    format: String,
    parameters_id: Option<String>,
}

impl TileRange {
    /// Create a range over `[zoom_start, zoom_stop]`.
    ///
    /// Returns an error unless both zooms are `-1` or `0 <= zoom_start <= zoom_stop`.
    pub fn new(
        layer_name: impl Into<String>,
        gridset_id: impl Into<String>,
        zoom_start: i32,
        zoom_stop: i32,
        format: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let wildcard = zoom_start == -1 && zoom_stop == -1;
        if !wildcard && (zoom_start < 0 || zoom_start > zoom_stop) {
            return Err(StorageError::InvalidRange(format!(
                "zoom window [{}, {}] is not valid",
                zoom_start, zoom_stop
            )));
        }
        Ok(Self {
            layer_name: layer_name.into(),
            gridset_id: gridset_id.into(),
            zoom_start,
            zoom_stop,
            bounds: BTreeMap::new(),
            format: format.into(),
            parameters_id: None,
        })
    }

    /// Create a range covering every zoom level.
    pub fn all_zooms(
        layer_name: impl Into<String>,
        gridset_id: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            layer_name: layer_name.into(),
            gridset_id: gridset_id.into(),
            zoom_start: -1,
            zoom_stop: -1,
            bounds: BTreeMap::new(),
            format: format.into(),
            parameters_id: None,
        }
    }

    /// Restrict zoom level `z` to the given rectangle.
    pub fn with_bounds(mut self, z: i32, bounds: RangeBounds) -> Self {
        self.bounds.insert(z, bounds);
        self
    }

    pub fn with_parameters_id(mut self, parameters_id: impl Into<String>) -> Self {
        self.parameters_id = Some(parameters_id.into());
        self
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn gridset_id(&self) -> &str {
        &self.gridset_id
    }

    pub fn zoom_start(&self) -> i32 {
        self.zoom_start
    }

    pub fn zoom_stop(&self) -> i32 {
        self.zoom_stop
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn parameters_id(&self) -> Option<&str> {
        self.parameters_id.as_deref()
    }

    pub fn is_all_zooms(&self) -> bool {
        self.zoom_start == -1 && self.zoom_stop == -1
    }

    pub fn includes_zoom(&self, z: i32) -> bool {
        self.is_all_zooms() || (self.zoom_start <= z && z <= self.zoom_stop)
    }

    pub fn bounds_at(&self, z: i32) -> Option<&RangeBounds> {
        self.bounds.get(&z)
    }

    /// Whether tile `(x, y, z)` belongs to this range.
    pub fn contains(&self, x: i64, y: i64, z: i32) -> bool {
        if !self.includes_zoom(z) {
            return false;
        }
        self.bounds_at(z).map_or(true, |b| b.contains(x, y))
    }

    /// Whether column `x` at zoom `z` can hold tiles of this range.
    pub fn contains_column(&self, x: i64, z: i32) -> bool {
        if !self.includes_zoom(z) {
            return false;
        }
        self.bounds_at(z).map_or(true, |b| b.contains_x(x))
    }

    /// Whether the rectangle `rect` at zoom `z` overlaps this range.
    pub fn intersects(&self, z: i32, rect: &RangeBounds) -> bool {
        if !self.includes_zoom(z) {
            return false;
        }
        self.bounds_at(z).map_or(true, |b| b.intersects(rect))
    }
}
