//! Test utilities for integration tests.
//!
//! Helpers to open stores in temporary directories and a listener that
//! records every event it receives.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tile_store::path::Convention;
use tile_store::{BlobStoreListener, FileBlobStore, Layout, StoreConfig, TileKey};

// =============================================================================
// Stores
// =============================================================================

/// Store configuration with a short metadata verification pause.
pub fn test_config(root: &Path) -> StoreConfig {
    StoreConfig::new(root).with_wait_after_rename(Duration::from_millis(1))
}

pub fn open_sharded(root: &Path) -> FileBlobStore {
    FileBlobStore::open(test_config(root)).expect("open sharded store")
}

pub fn open_xyz(root: &Path, convention: Convention) -> FileBlobStore {
    FileBlobStore::open(test_config(root).with_layout(Layout::Xyz { convention }))
        .expect("open xyz store")
}

/// Key in the `africa` layer, `EPSG:4326`, PNG.
pub fn africa(x: i64, y: i64, z: i32) -> TileKey {
    TileKey::new("africa", "EPSG:4326", (x, y, z), "image/png")
}

/// Payload filled with one byte value.
pub fn payload(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

/// Number of regular files below `dir`.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// =============================================================================
// Recording Listener
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Stored { key: TileKey, size: u64 },
    Updated { key: TileKey, size: u64, old_size: u64 },
    Deleted { key: TileKey, size: u64 },
    LayerDeleted(String),
    LayerRenamed(String, String),
    GridSubsetDeleted(String, String),
    ParametersDeleted(String, String),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    /// Register a new recorder with `store`.
    pub fn attach(store: &FileBlobStore) -> Arc<Self> {
        let listener = Arc::new(Self::default());
        store.add_listener(listener.clone());
        listener
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl BlobStoreListener for RecordingListener {
    fn tile_stored(&self, key: &TileKey, padded_size: u64) {
        self.record(Event::Stored {
            key: key.clone(),
            size: padded_size,
        });
    }

    fn tile_updated(&self, key: &TileKey, padded_size: u64, old_padded_size: u64) {
        self.record(Event::Updated {
            key: key.clone(),
            size: padded_size,
            old_size: old_padded_size,
        });
    }

    fn tile_deleted(&self, key: &TileKey, padded_size: u64) {
        self.record(Event::Deleted {
            key: key.clone(),
            size: padded_size,
        });
    }

    fn layer_deleted(&self, layer_name: &str) {
        self.record(Event::LayerDeleted(layer_name.to_string()));
    }

    fn layer_renamed(&self, old_layer_name: &str, new_layer_name: &str) {
        self.record(Event::LayerRenamed(
            old_layer_name.to_string(),
            new_layer_name.to_string(),
        ));
    }

    fn grid_subset_deleted(&self, layer_name: &str, gridset_id: &str) {
        self.record(Event::GridSubsetDeleted(
            layer_name.to_string(),
            gridset_id.to_string(),
        ));
    }

    fn parameters_deleted(&self, layer_name: &str, parameters_id: &str) {
        self.record(Event::ParametersDeleted(
            layer_name.to_string(),
            parameters_id.to_string(),
        ));
    }
}
