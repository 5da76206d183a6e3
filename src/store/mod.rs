//! The file blob store and its building blocks.
//!
//! # Components
//!
//! - [`FileBlobStore`]: Facade for tile, layer, metadata and parameter operations
//! - [`write_atomic`]: Temp-file-then-rename writes that never expose partial files
//! - [`StagedDeleter`]: Renames doomed directories aside and removes them on a worker thread
//! - [`LayerMetadataStore`]: Per-layer key/value properties with optimistic retries
//! - [`LockShards`]: Fixed pool of read/write locks keyed by file path
//! - [`BlobStoreListener`]: Change notifications with block-padded sizes
//!
//! # Example
//!
//! ```no_run
//! use tile_store::config::StoreConfig;
//! use tile_store::store::FileBlobStore;
//! use tile_store::tile::{TileBlob, TileKey};
//!
//! let store = FileBlobStore::open(StoreConfig::new("/var/cache/tiles"))?;
//! let key = TileKey::new("states", "EPSG:2163", (0, 0, 0), "image/png");
//! store.put(TileBlob::new(key.clone(), &b"png bytes"[..]))?;
//! assert!(store.get(&key)?.is_some());
//! store.close();
//! # Ok::<(), tile_store::StorageError>(())
//! ```

mod atomic;
mod file_store;
mod listener;
mod locks;
mod metadata;
pub mod properties;
mod retry;
mod staging;

pub use atomic::{write_atomic, write_atomic_with, TempNameGenerator, WriteOutcome, TEMP_NAME_ROLLOVER};
pub use file_store::{
    CacheUsage, FileBlobStore, LEGACY_PARAMETERS_KEY_PREFIX, PARAMETERS_FILE_PREFIX,
    PARAMETERS_FILE_SUFFIX, TMP_DIR_NAME,
};
pub use listener::{BlobStoreListener, ListenerList};
pub use locks::{LockShards, DEFAULT_LOCK_SHARDS};
pub use metadata::{
    LayerMetadataStore, DEFAULT_METADATA_MAX_ATTEMPTS, DEFAULT_WAIT_AFTER_RENAME,
    METADATA_FILE_NAME, METADATA_GZIP_FILE_NAME,
};
pub use retry::{retry_bounded, Attempt, MetadataWrite, ReadOutcome, Retried};
pub use staging::{StagedDeleter, STAGING_DIR_NAME};
