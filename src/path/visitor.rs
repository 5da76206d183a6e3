use std::path::Path;

use crate::error::StorageError;

use super::util::remove_if_empty;

/// Callbacks invoked while walking the tiles of a range.
///
/// Directories are visited depth-first: `pre_visit_directory` on entry, the
/// matching tiles below it, then `post_visit_directory` on exit.
pub trait TileFileVisitor {
    fn pre_visit_directory(&mut self, _dir: &Path) -> Result<(), StorageError> {
        Ok(())
    }

    /// Called for each tile file inside the range.
    fn visit_file(&mut self, file: &Path, x: i64, y: i64, z: i32) -> Result<(), StorageError>;

    /// Called when leaving a directory.
    ///
    /// The default removes the directory if it has become empty, which prunes
    /// shard and zoom directories emptied by a bulk delete.
    fn post_visit_directory(&mut self, dir: &Path) -> Result<(), StorageError> {
        remove_if_empty(dir);
        Ok(())
    }
}

/// Coordinates recovered from a tile path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub z: i32,
}

/// Collects matching tiles without touching the tree.
#[derive(Debug, Default)]
pub struct TileCollector {
    pub tiles: Vec<TileCoord>,
}

impl TileFileVisitor for TileCollector {
    fn visit_file(&mut self, _file: &Path, x: i64, y: i64, z: i32) -> Result<(), StorageError> {
        self.tiles.push(TileCoord { x, y, z });
        Ok(())
    }

    fn post_visit_directory(&mut self, _dir: &Path) -> Result<(), StorageError> {
        Ok(())
    }
}
