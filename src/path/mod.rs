//! Tile path layouts.
//!
//! A [`PathGenerator`] maps a [`TileKey`] to the file that stores it, and
//! walks a layer directory to find the files belonging to a [`TileRange`].
//! Both directions of the mapping must agree: every path produced by
//! `tile_path` decodes back to the same coordinates.
//!
//! # Layouts
//!
//! ```text
//! sharded:  <root>/<layer>/<gridset>_<zz>[_<params>]/<halfX>_<halfY>/<x>_<y>.<ext>
//! xyz/tms:  <root>/<layer>/<gridset>[_<params>]/<z>/<x>/<y>.<ext>
//! ```
//!
//! Generators are stateless apart from their configuration, so they are
//! shared across threads without locking.

mod sharded;
mod util;
mod visitor;
mod xyz;

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::tile::{TileKey, TileRange};

pub use sharded::{shard_bounds, shard_digits, shard_half, ShardedPathFilter, ShardedPathGenerator};
pub use util::{
    check_parameters_id, check_tile_key, filtered_gridset_id, filtered_layer_name,
    find_parameters_id, find_zoom_level, parameters_id_from_dir_name, remove_if_empty, zero_pad,
    MAX_ZOOM,
};
pub use visitor::{TileCollector, TileCoord, TileFileVisitor};
pub use xyz::{Convention, XyzPathFilter, XyzPathGenerator};

pub(crate) use util::{ensure_dir, list_children};

/// Maps tiles to files and enumerates the files of a tile range.
pub trait PathGenerator: Send + Sync {
    /// Store root the generated paths live under.
    fn root(&self) -> &Path;

    /// Directory holding every tile of a layer.
    fn layer_path(&self, layer_name: &str) -> PathBuf {
        self.root().join(filtered_layer_name(layer_name))
    }

    /// File that stores `key`. Fails on unknown formats and, for the XYZ
    /// convention, on grid sets the registry does not know.
    fn tile_path(&self, key: &TileKey) -> Result<PathBuf, StorageError>;

    /// Whether `dir_name`, directly below a layer directory, holds tiles of `gridset_id`.
    fn is_gridset_dir(&self, gridset_id: &str, dir_name: &str) -> bool;

    /// Recover tile coordinates from a path produced by [`Self::tile_path`].
    ///
    /// Returns `None` for paths that do not follow the layout.
    fn decode(&self, gridset_id: &str, tile_path: &Path) -> Option<TileCoord>;

    /// Walk `layer_dir` depth-first, calling `visitor` for every tile of `range`.
    ///
    /// Directories that cannot hold tiles of the range are not entered.
    fn visit_range(
        &self,
        layer_dir: &Path,
        range: &TileRange,
        visitor: &mut dyn TileFileVisitor,
    ) -> Result<(), StorageError>;
}
