//! Directory and file naming helpers shared by both path layouts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, StorageError};
use crate::tile::TileKey;

/// Highest zoom level either layout can address.
///
/// The sharded layout's block side `2 << (z / 2)` must fit in an `i64`.
pub const MAX_ZOOM: i32 = 62;

/// Make a layer name safe to use as a single directory name.
///
/// ASCII letters, digits, `-`, `_` and `.` are kept; everything else becomes `_`.
/// Names made only of dots are fully replaced so they cannot walk up the tree.
pub fn filtered_layer_name(layer_name: &str) -> String {
    let filtered: String = layer_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if filtered.chars().all(|c| c == '.') {
        "_".repeat(filtered.len().max(1))
    } else {
        filtered
    }
}

/// Grid set id as it appears in directory names (`EPSG:4326` -> `EPSG_4326`).
pub fn filtered_gridset_id(gridset_id: &str) -> String {
    filtered_layer_name(gridset_id)
}

/// Left-pad `value` with zeros to at least `digits` characters.
pub fn zero_pad(value: i64, digits: usize) -> String {
    format!("{:0width$}", value, width = digits)
}

/// Reject parameters ids that could not be used verbatim as a directory name suffix.
pub fn check_parameters_id(id: &str) -> Result<&str, StorageError> {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(id)
    } else {
        Err(StorageError::InvalidParametersId(id.to_string()))
    }
}

/// Check that a tile key can be turned into a path.
pub fn check_tile_key(key: &TileKey) -> Result<(), StorageError> {
    let (x, y, z) = key.xyz();
    if x < 0 || y < 0 || !(0..=MAX_ZOOM).contains(&z) {
        return Err(StorageError::InvalidTile { x, y, z });
    }
    if let Some(id) = key.parameters_id() {
        check_parameters_id(id)?;
    }
    Ok(())
}

/// Extract the zoom level from `<gridset_prefix>_<zz>[_<parameters_id>]`.
pub fn find_zoom_level(gridset_prefix: &str, dir_name: &str) -> Option<i32> {
    let rest = dir_name.strip_prefix(gridset_prefix)?.strip_prefix('_')?;
    let zoom = rest.split('_').next()?;
    parse_zoom(zoom)
}

/// Parse a zoom level directory component; levels past [`MAX_ZOOM`] are not ours.
pub(crate) fn parse_zoom(s: &str) -> Option<i32> {
    parse_digits(s).filter(|z| *z <= MAX_ZOOM)
}

/// Extract the parameters id from `<gridset_prefix>_<zz>_<parameters_id>`.
pub fn find_parameters_id<'a>(gridset_prefix: &str, dir_name: &'a str) -> Option<&'a str> {
    let rest = dir_name.strip_prefix(gridset_prefix)?.strip_prefix('_')?;
    rest.split_once('_')
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

/// Parameters id suffix of a directory directly below a layer directory.
///
/// Both layouts end parameterized directory names with `_<id>`; the id is
/// recognized by its fixed length.
pub fn parameters_id_from_dir_name(dir_name: &str, id_len: usize) -> Option<&str> {
    let (_, id) = dir_name.rsplit_once('_')?;
    (id.len() == id_len && id.chars().all(|c| c.is_ascii_alphanumeric())).then_some(id)
}

/// Parse a non-negative decimal number with no sign or whitespace.
pub(crate) fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Split `name.ext` at the last dot.
pub(crate) fn split_extension(file_name: &str) -> Option<(&str, &str)> {
    file_name.rsplit_once('.')
}

/// A child of a directory listing.
pub(crate) struct Child {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

/// List a directory; a directory that vanished concurrently lists as empty.
///
/// Entries whose names are not valid UTF-8 cannot belong to the cache and are skipped.
pub(crate) fn list_children(dir: &Path) -> Result<Vec<Child>, StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut children = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::io(dir, e)),
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = match entry.file_type() {
            Ok(file_type) => file_type.is_dir(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StorageError::io(entry.path(), e)),
        };
        children.push(Child {
            path: entry.path(),
            name,
            is_dir,
        });
    }
    Ok(children)
}

/// Remove `dir` if it is empty. Non-empty or missing directories are left alone.
pub fn remove_if_empty(dir: &Path) -> bool {
    fs::remove_dir(dir).is_ok()
}

/// Create `dir` and its parents; an existing directory is not an error.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).at(dir)
}
