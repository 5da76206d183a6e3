//! Blob store change notifications.
//!
//! Listeners are called synchronously on the thread that made the change, in
//! the order the changes happen. Sizes are padded to the disk block size so
//! that quota accounting sees the space a file actually occupies.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::tile::TileKey;

/// Receives notifications about stored and removed tiles.
///
/// Every method has an empty default, so implementors only override what
/// they track.
#[allow(unused_variables)]
pub trait BlobStoreListener: Send + Sync {
    /// A new tile was written.
    fn tile_stored(&self, key: &TileKey, padded_size: u64) {}

    /// An existing tile was replaced.
    fn tile_updated(&self, key: &TileKey, padded_size: u64, old_padded_size: u64) {}

    /// A tile was removed.
    fn tile_deleted(&self, key: &TileKey, padded_size: u64) {}

    /// A whole layer was removed.
    fn layer_deleted(&self, layer_name: &str) {}

    /// A layer was renamed.
    fn layer_renamed(&self, old_layer_name: &str, new_layer_name: &str) {}

    /// Every tile of a layer in one grid set was removed.
    fn grid_subset_deleted(&self, layer_name: &str, gridset_id: &str) {}

    /// Every tile of a layer with one parameters id was removed.
    fn parameters_deleted(&self, layer_name: &str, parameters_id: &str) {}
}

/// Registered listeners.
#[derive(Default)]
pub struct ListenerList {
    listeners: RwLock<Vec<Arc<dyn BlobStoreListener>>>,
}

impl std::fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.len())
            .finish()
    }
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn BlobStoreListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn BlobStoreListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn each(&self, mut f: impl FnMut(&dyn BlobStoreListener)) {
        // snapshot so listeners may register others without deadlocking
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    pub fn send_tile_stored(&self, key: &TileKey, padded_size: u64) {
        self.each(|l| l.tile_stored(key, padded_size));
    }

    pub fn send_tile_updated(&self, key: &TileKey, padded_size: u64, old_padded_size: u64) {
        self.each(|l| l.tile_updated(key, padded_size, old_padded_size));
    }

    pub fn send_tile_deleted(&self, key: &TileKey, padded_size: u64) {
        self.each(|l| l.tile_deleted(key, padded_size));
    }

    pub fn send_layer_deleted(&self, layer_name: &str) {
        self.each(|l| l.layer_deleted(layer_name));
    }

    pub fn send_layer_renamed(&self, old_layer_name: &str, new_layer_name: &str) {
        self.each(|l| l.layer_renamed(old_layer_name, new_layer_name));
    }

    pub fn send_grid_subset_deleted(&self, layer_name: &str, gridset_id: &str) {
        self.each(|l| l.grid_subset_deleted(layer_name, gridset_id));
    }

    pub fn send_parameters_deleted(&self, layer_name: &str, parameters_id: &str) {
        self.each(|l| l.parameters_deleted(layer_name, parameters_id));
    }
}
