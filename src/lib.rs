//! # Tile Store
//!
//! A file system blob store for map tile caches.
//!
//! Tiles are addressed by layer, grid set, x/y/z coordinates, format and an
//! optional parameters id, and stored one file per tile under a configurable
//! directory layout. The store is safe to share between threads and between
//! processes pointing at the same root:
//!
//! - **Atomic writes**: tiles and metadata are written to a temp file and renamed into place
//! - **Staged deletes**: whole layers and subsets are renamed aside and removed in the background
//! - **Crash recovery**: deletions interrupted by a crash resume on the next open
//! - **Optimistic metadata**: per-layer properties converge under concurrent writers
//!
//! ## Architecture
//!
//! - [`tile`] - Tile keys, blobs, ranges, formats and parameter ids
//! - [`path`] - Sharded and XYZ directory layouts and range traversal
//! - [`store`] - The [`FileBlobStore`] facade and its building blocks
//! - [`config`] - Store settings and CLI types
//! - [`error`] - The [`StorageError`] type
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_store::{FileBlobStore, StoreConfig, TileBlob, TileKey, TileRange};
//!
//! let store = FileBlobStore::open(StoreConfig::new("/var/cache/tiles"))?;
//!
//! let key = TileKey::new("africa", "EPSG:4326", (10, 50, 5), "image/png");
//! store.put(TileBlob::new(key.clone(), &b"png bytes"[..]))?;
//!
//! let range = TileRange::new("africa", "EPSG:4326", 0, 5, "image/png")?;
//! store.delete_range(&range)?;
//! store.close();
//! # Ok::<(), tile_store::StorageError>(())
//! ```

pub mod config;
pub mod error;
pub mod path;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{Layout, StoreConfig, SuitabilityCheck};
pub use error::StorageError;
pub use path::{Convention, PathGenerator, ShardedPathGenerator, XyzPathGenerator};
pub use store::{BlobStoreListener, CacheUsage, FileBlobStore, MetadataWrite};
pub use tile::{
    GridRegistry, MimeType, ParameterHasher, ParameterSet, RangeBounds, Sha256ParameterHasher,
    StaticGridRegistry, TileBlob, TileKey, TileRange,
};
