use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the file blob store.
///
/// Lost races between concurrent writers are not errors; they surface as
/// outcome values (see [`crate::store::WriteOutcome`]) and are logged.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A filesystem call failed on the given path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store root exists but is not a directory
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// The store root cannot be written to
    #[error("{} is not a writable directory", path.display())]
    NotWritable { path: PathBuf },

    /// The store root holds content that does not belong to a file blob store
    #[error("{} is not suitable for a file blob store ({check} check): {reason}", path.display())]
    Unsuitable {
        path: PathBuf,
        check: &'static str,
        reason: String,
    },

    /// Rename target already exists
    #[error("Can't rename layer directory {} to {}: target already exists", from.display(), to.display())]
    AlreadyExists { from: PathBuf, to: PathBuf },

    /// The tile format has no known file extension
    #[error("Unknown tile format: {0}")]
    UnknownFormat(String),

    /// The grid registry has no grid for the requested grid set and zoom level
    #[error("Grid set {gridset_id} has no grid at zoom level {zoom}")]
    UnknownGrid { gridset_id: String, zoom: i32 },

    /// A parameters id that is not a plain alphanumeric token
    #[error("Invalid parameters id {0:?}: expected ASCII letters and digits only")]
    InvalidParametersId(String),

    /// Tile coordinates outside what the layouts can address
    #[error("Invalid tile coordinates x={x} y={y} z={z}")]
    InvalidTile { x: i64, y: i64, z: i32 },

    /// The tile range is malformed
    #[error("Invalid tile range: {0}")]
    InvalidRange(String),

    /// The store configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The background deletion worker has shut down
    #[error("Background deletion worker is not running")]
    WorkerUnavailable,
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error wraps an I/O `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Attaches the offending path to `std::io` results.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T, StorageError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, StorageError> {
        self.map_err(|e| StorageError::io(path, e))
    }
}
