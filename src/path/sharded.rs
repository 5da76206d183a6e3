//! Sharded tile layout.
//!
//! Tiles are stored as
//!
//! ```text
//! <root>/<layer>/<gridset>_<zz>[_<parametersId>]/<halfX>_<halfY>/<x>_<y>.<ext>
//! ```
//!
//! The shard directory groups a square block of `half x half` tiles where
//! `half = 2^(z/2 + 1)`. Tile count grows as `4^z` while `half^2` grows as
//! `2^z`, so both the number of shards per zoom directory and the number of
//! tiles per shard stay close to `2^z`.

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::tile::{MimeType, RangeBounds, TileKey, TileRange};

use super::util::{
    check_parameters_id, check_tile_key, filtered_gridset_id, filtered_layer_name,
    find_parameters_id, find_zoom_level, list_children, parse_digits, split_extension, zero_pad,
    MAX_ZOOM,
};
use super::visitor::{TileCoord, TileFileVisitor};
use super::PathGenerator;

/// Side length of the square block of tiles one shard directory holds at zoom `z`.
pub fn shard_half(z: i32) -> i64 {
    2_i64 << (z.clamp(0, MAX_ZOOM) / 2)
}

/// Zero padding width of shard coordinates: the decimal digit count of `half`.
///
/// `half` is a power of two, so this equals `ceil(log10(half))`.
pub fn shard_digits(half: i64) -> usize {
    let mut digits = 1;
    let mut rest = half / 10;
    while rest > 0 {
        digits += 1;
        rest /= 10;
    }
    digits
}

/// Rectangle of tile coordinates covered by shard `(half_x, half_y)` at zoom `z`.
pub fn shard_bounds(half_x: i64, half_y: i64, z: i32) -> RangeBounds {
    let half = shard_half(z);
    let min_x = half_x.saturating_mul(half);
    let min_y = half_y.saturating_mul(half);
    RangeBounds::new(
        min_x,
        min_y,
        min_x.saturating_add(half - 1),
        min_y.saturating_add(half - 1),
    )
}

// =============================================================================
// Generator
// =============================================================================

/// Path generator for the sharded layout.
#[derive(Debug, Clone)]
pub struct ShardedPathGenerator {
    root: PathBuf,
}

impl ShardedPathGenerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Name of the zoom level directory: `<gridset>_<zz>[_<parametersId>]`.
    pub fn zoom_dir_name(gridset_id: &str, z: i32, parameters_id: Option<&str>) -> String {
        let mut name = filtered_gridset_id(gridset_id);
        name.push('_');
        name.push_str(&zero_pad(i64::from(z), 2));
        if let Some(id) = parameters_id {
            name.push('_');
            name.push_str(id);
        }
        name
    }
}

impl PathGenerator for ShardedPathGenerator {
    fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, key: &TileKey) -> Result<PathBuf, StorageError> {
        check_tile_key(key)?;
        let mime = MimeType::from_format(key.format())?;
        let (x, y, z) = key.xyz();

        let half = shard_half(z);
        let digits = shard_digits(half);

        let shard = format!(
            "{}_{}",
            zero_pad(x / half, digits),
            zero_pad(y / half, digits)
        );
        let file = format!(
            "{}_{}.{}",
            zero_pad(x, 2 * digits),
            zero_pad(y, 2 * digits),
            mime.extension()
        );

        let mut path = self.root.join(filtered_layer_name(key.layer_name()));
        path.push(Self::zoom_dir_name(key.gridset_id(), z, key.parameters_id()));
        path.push(shard);
        path.push(file);
        Ok(path)
    }

    fn is_gridset_dir(&self, gridset_id: &str, dir_name: &str) -> bool {
        find_zoom_level(&filtered_gridset_id(gridset_id), dir_name).is_some()
    }

    fn decode(&self, gridset_id: &str, tile_path: &Path) -> Option<TileCoord> {
        let gridset_prefix = filtered_gridset_id(gridset_id);
        let file_name = tile_path.file_name()?.to_str()?;
        let shard_dir = tile_path.parent()?;
        let zoom_dir = shard_dir.parent()?.file_name()?.to_str()?;

        let z = find_zoom_level(&gridset_prefix, zoom_dir)?;
        let (x, y) = parse_coordinate_pair(split_extension(file_name)?.0)?;
        let (half_x, half_y) = parse_coordinate_pair(shard_dir.file_name()?.to_str()?)?;

        let half = shard_half(z);
        (x / half == half_x && y / half == half_y).then_some(TileCoord { x, y, z })
    }

    fn visit_range(
        &self,
        layer_dir: &Path,
        range: &TileRange,
        visitor: &mut dyn TileFileVisitor,
    ) -> Result<(), StorageError> {
        let filter = ShardedPathFilter::new(range)?;

        for zoom_dir in list_children(layer_dir)? {
            if !zoom_dir.is_dir {
                continue;
            }
            let Some(z) = filter.accept_zoom_dir(&zoom_dir.name) else {
                continue;
            };
            visitor.pre_visit_directory(&zoom_dir.path)?;

            for shard_dir in list_children(&zoom_dir.path)? {
                if !shard_dir.is_dir || !filter.accept_shard_dir(z, &shard_dir.name) {
                    continue;
                }
                visitor.pre_visit_directory(&shard_dir.path)?;

                for tile in list_children(&shard_dir.path)? {
                    if tile.is_dir {
                        continue;
                    }
                    if let Some((x, y)) = filter.accept_tile_file(z, &tile.name) {
                        visitor.visit_file(&tile.path, x, y, z)?;
                    }
                }

                visitor.post_visit_directory(&shard_dir.path)?;
            }

            visitor.post_visit_directory(&zoom_dir.path)?;
        }
        Ok(())
    }
}

/// Parse `<a>_<b>` into two non-negative numbers.
fn parse_coordinate_pair(s: &str) -> Option<(i64, i64)> {
    let (a, b) = s.split_once('_')?;
    Some((parse_digits(a)?, parse_digits(b)?))
}

// =============================================================================
// Filter
// =============================================================================

/// Decides which names of the sharded layout can hold tiles of a range.
///
/// Names that do not follow the layout never match.
#[derive(Debug)]
pub struct ShardedPathFilter<'a> {
    range: &'a TileRange,
    gridset_prefix: String,
    mime: MimeType,
}

impl<'a> ShardedPathFilter<'a> {
    pub fn new(range: &'a TileRange) -> Result<Self, StorageError> {
        if let Some(id) = range.parameters_id() {
            check_parameters_id(id)?;
        }
        Ok(Self {
            range,
            gridset_prefix: filtered_gridset_id(range.gridset_id()),
            mime: MimeType::from_format(range.format())?,
        })
    }

    /// Accept a `<gridset>_<zz>[_<parametersId>]` directory, returning its zoom level.
    pub fn accept_zoom_dir(&self, name: &str) -> Option<i32> {
        let z = find_zoom_level(&self.gridset_prefix, name)?;
        if !self.range.includes_zoom(z) {
            return None;
        }
        let parameters_id = find_parameters_id(&self.gridset_prefix, name);
        (parameters_id == self.range.parameters_id()).then_some(z)
    }

    /// Accept a `<halfX>_<halfY>` shard directory whose block overlaps the range.
    pub fn accept_shard_dir(&self, z: i32, name: &str) -> bool {
        match parse_coordinate_pair(name) {
            Some((half_x, half_y)) => self.range.intersects(z, &shard_bounds(half_x, half_y, z)),
            None => false,
        }
    }

    /// Accept a `<x>_<y>.<ext>` tile file inside the range, returning its coordinates.
    pub fn accept_tile_file(&self, z: i32, name: &str) -> Option<(i64, i64)> {
        let (stem, extension) = split_extension(name)?;
        if !self.mime.matches_extension(extension) {
            return None;
        }
        let (x, y) = parse_coordinate_pair(stem)?;
        self.range.contains(x, y, z).then_some((x, y))
    }
}
