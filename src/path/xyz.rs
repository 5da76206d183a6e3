//! XYZ / TMS tile layout.
//!
//! Tiles are stored as
//!
//! ```text
//! <root>/<layer>/<gridset>[_<parametersId>]/<z>/<x>/<y>.<ext>
//! ```
//!
//! with no shard directory and no zero padding. Under [`Convention::Tms`]
//! row 0 is the southernmost row and `y` is stored as is. Under
//! [`Convention::Xyz`] (slippy map) row 0 is the northernmost row and the
//! stored row is `tiles_high - y - 1`. The flip is its own inverse, so the
//! same function converts in both directions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::tile::{GridRegistry, MimeType, TileKey, TileRange};

use super::util::{
    check_parameters_id, check_tile_key, filtered_gridset_id, filtered_layer_name, list_children,
    parse_digits, parse_zoom, split_extension,
};
use super::visitor::{TileCoord, TileFileVisitor};
use super::PathGenerator;

/// Y axis numbering of the stored tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// Rows numbered from the south northwards
    #[default]
    Tms,
    /// Rows numbered from the north southwards
    Xyz,
}

/// Path generator for the XYZ / TMS layout.
#[derive(Clone)]
pub struct XyzPathGenerator {
    root: PathBuf,
    grids: Arc<dyn GridRegistry>,
    convention: Convention,
}

impl std::fmt::Debug for XyzPathGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XyzPathGenerator")
            .field("root", &self.root)
            .field("convention", &self.convention)
            .finish()
    }
}

impl XyzPathGenerator {
    pub fn new(root: impl Into<PathBuf>, grids: Arc<dyn GridRegistry>, convention: Convention) -> Self {
        Self {
            root: root.into(),
            grids,
            convention,
        }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Convert a row between the internal (TMS) numbering and the stored numbering.
    pub fn convert_y(&self, gridset_id: &str, y: i64, z: i32) -> Result<i64, StorageError> {
        match self.convention {
            Convention::Tms => Ok(y),
            Convention::Xyz => {
                let tiles_high = self.grids.tiles_high(gridset_id, z)?;
                Ok(tiles_high - y - 1)
            }
        }
    }

    /// Name of the grid set directory: `<gridset>[_<parametersId>]`.
    pub fn gridset_dir_name(gridset_id: &str, parameters_id: Option<&str>) -> String {
        let mut name = filtered_gridset_id(gridset_id);
        if let Some(id) = parameters_id {
            name.push('_');
            name.push_str(id);
        }
        name
    }
}

impl PathGenerator for XyzPathGenerator {
    fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, key: &TileKey) -> Result<PathBuf, StorageError> {
        check_tile_key(key)?;
        let mime = MimeType::from_format(key.format())?;
        let (x, y, z) = key.xyz();
        let stored_y = self.convert_y(key.gridset_id(), y, z)?;
        if stored_y < 0 {
            return Err(StorageError::InvalidTile { x, y, z });
        }

        let mut path = self.root.join(filtered_layer_name(key.layer_name()));
        path.push(Self::gridset_dir_name(key.gridset_id(), key.parameters_id()));
        path.push(z.to_string());
        path.push(x.to_string());
        path.push(format!("{}.{}", stored_y, mime.extension()));
        Ok(path)
    }

    fn is_gridset_dir(&self, gridset_id: &str, dir_name: &str) -> bool {
        let Some(rest) = dir_name.strip_prefix(&filtered_gridset_id(gridset_id)) else {
            return false;
        };
        match rest.strip_prefix('_') {
            None => rest.is_empty(),
            Some(id) => !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()),
        }
    }

    fn decode(&self, gridset_id: &str, tile_path: &Path) -> Option<TileCoord> {
        let (stem, _) = split_extension(tile_path.file_name()?.to_str()?)?;
        let x_dir = tile_path.parent()?;
        let z_dir = x_dir.parent()?;
        let gridset_dir = z_dir.parent()?.file_name()?.to_str()?;

        if !self.is_gridset_dir(gridset_id, gridset_dir) {
            return None;
        }

        let z = parse_zoom(z_dir.file_name()?.to_str()?)?;
        let x = parse_digits(x_dir.file_name()?.to_str()?)?;
        let y = self.convert_y(gridset_id, parse_digits(stem)?, z).ok()?;
        Some(TileCoord { x, y, z })
    }

    fn visit_range(
        &self,
        layer_dir: &Path,
        range: &TileRange,
        visitor: &mut dyn TileFileVisitor,
    ) -> Result<(), StorageError> {
        let filter = XyzPathFilter::new(range, self)?;

        for gridset_dir in list_children(layer_dir)? {
            if !gridset_dir.is_dir || !filter.accept_gridset_dir(&gridset_dir.name) {
                continue;
            }
            visitor.pre_visit_directory(&gridset_dir.path)?;

            for zoom_dir in list_children(&gridset_dir.path)? {
                if !zoom_dir.is_dir {
                    continue;
                }
                let Some(z) = filter.accept_zoom_dir(&zoom_dir.name) else {
                    continue;
                };
                visitor.pre_visit_directory(&zoom_dir.path)?;

                for column_dir in list_children(&zoom_dir.path)? {
                    if !column_dir.is_dir {
                        continue;
                    }
                    let Some(x) = filter.accept_column_dir(z, &column_dir.name) else {
                        continue;
                    };
                    visitor.pre_visit_directory(&column_dir.path)?;

                    for tile in list_children(&column_dir.path)? {
                        if tile.is_dir {
                            continue;
                        }
                        if let Some(y) = filter.accept_tile_file(x, z, &tile.name) {
                            visitor.visit_file(&tile.path, x, y, z)?;
                        }
                    }

                    visitor.post_visit_directory(&column_dir.path)?;
                }

                visitor.post_visit_directory(&zoom_dir.path)?;
            }

            visitor.post_visit_directory(&gridset_dir.path)?;
        }
        Ok(())
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Decides which names of the XYZ layout can hold tiles of a range.
pub struct XyzPathFilter<'a> {
    range: &'a TileRange,
    generator: &'a XyzPathGenerator,
    gridset_prefix: String,
    mime: MimeType,
}

impl<'a> XyzPathFilter<'a> {
    pub fn new(range: &'a TileRange, generator: &'a XyzPathGenerator) -> Result<Self, StorageError> {
        if let Some(id) = range.parameters_id() {
            check_parameters_id(id)?;
        }
        Ok(Self {
            range,
            generator,
            gridset_prefix: filtered_gridset_id(range.gridset_id()),
            mime: MimeType::from_format(range.format())?,
        })
    }

    /// Accept `<gridset>` when the range has no parameters id, or
    /// `<gridset>_<parametersId>` when it does.
    pub fn accept_gridset_dir(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(&self.gridset_prefix) else {
            return false;
        };
        match self.range.parameters_id() {
            None => rest.is_empty(),
            Some(id) => rest.strip_prefix('_') == Some(id),
        }
    }

    /// Accept a `<z>` directory inside the zoom window.
    pub fn accept_zoom_dir(&self, name: &str) -> Option<i32> {
        let z = parse_zoom(name)?;
        self.range.includes_zoom(z).then_some(z)
    }

    /// Accept an `<x>` column directory overlapping the range at zoom `z`.
    pub fn accept_column_dir(&self, z: i32, name: &str) -> Option<i64> {
        let x = parse_digits(name)?;
        self.range.contains_column(x, z).then_some(x)
    }

    /// Accept a `<y>.<ext>` tile file, returning its row in TMS numbering.
    pub fn accept_tile_file(&self, x: i64, z: i32, name: &str) -> Option<i64> {
        let (stem, extension) = split_extension(name)?;
        if !self.mime.matches_extension(extension) {
            return None;
        }
        let stored_y = parse_digits(stem)?;
        let y = self
            .generator
            .convert_y(self.range.gridset_id(), stored_y, z)
            .ok()?;
        self.range.contains(x, y, z).then_some(y)
    }
}
