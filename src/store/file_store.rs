//! The file blob store facade.
//!
//! [`FileBlobStore`] is the only entry point callers use. It computes tile
//! paths through a [`PathGenerator`], writes through the atomic write
//! protocol, hands directory removals to the [`StagedDeleter`] and keeps
//! layer metadata in a [`LayerMetadataStore`].
//!
//! # Root layout
//!
//! ```text
//! <root>/
//! ├── metadata.properties             store sentinel
//! ├── tmp/                            temp files of in-flight writes
//! ├── _gwc_in_progress_deletes_/      directories awaiting deletion
//! └── <layer>/
//!     ├── metadata.properties.gz      layer metadata
//!     ├── parameters-<id>.properties  parameters of a parameters id
//!     └── <gridset dirs>/...          tiles, see crate::path
//! ```
//!
//! All operations run on the caller's thread except the physical removal of
//! staged directories.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{Layout, StoreConfig, SuitabilityCheck};
use crate::error::{IoResultExt, StorageError};
use crate::path::{
    check_parameters_id, ensure_dir, list_children, parameters_id_from_dir_name, remove_if_empty,
    PathGenerator, ShardedPathGenerator, TileFileVisitor, XyzPathGenerator,
};
use crate::tile::{
    GridRegistry, ParameterHasher, ParameterSet, Sha256ParameterHasher, StaticGridRegistry, TileBlob,
    TileKey, TileRange,
};

use super::atomic::{write_atomic, write_atomic_with, TempNameGenerator, WriteOutcome};
use super::listener::{BlobStoreListener, ListenerList};
use super::metadata::{LayerMetadataStore, METADATA_FILE_NAME};
use super::properties::{self, Properties};
use super::retry::MetadataWrite;
use super::staging::{StagedDeleter, STAGING_DIR_NAME};

/// Name of the scratch directory for temp files.
pub const TMP_DIR_NAME: &str = "tmp";

/// Prefix of parameter side files.
pub const PARAMETERS_FILE_PREFIX: &str = "parameters-";

/// Suffix of parameter side files.
pub const PARAMETERS_FILE_SUFFIX: &str = ".properties";

/// Metadata key prefix under which older stores kept parameter mappings.
pub const LEGACY_PARAMETERS_KEY_PREFIX: &str = "parameters.";

/// Attempts at writing a tile whose directory keeps being pruned underneath it.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Tile count and padded size of a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub tiles: u64,
    pub bytes: u64,
}

/// Tile blob store on a local file system.
pub struct FileBlobStore {
    root: PathBuf,
    tmp_dir: PathBuf,
    paths: Box<dyn PathGenerator>,
    metadata: LayerMetadataStore,
    deleter: StagedDeleter,
    listeners: ListenerList,
    names: Arc<TempNameGenerator>,
    hasher: Arc<dyn ParameterHasher>,
    disk_block_size: u64,
}

impl std::fmt::Debug for FileBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBlobStore")
            .field("root", &self.root)
            .field("disk_block_size", &self.disk_block_size)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl FileBlobStore {
    /// Open a store with the world grid sets and SHA-256 parameter ids.
    pub fn open(config: StoreConfig) -> Result<Self, StorageError> {
        Self::open_with(
            config,
            Arc::new(StaticGridRegistry::with_world_grids()),
            Arc::new(Sha256ParameterHasher),
        )
    }

    /// Open a store at `config.root`.
    ///
    /// Checks the root is suitable, creates the sentinel, scratch and staging
    /// directories, and resumes deletions left over from a previous run.
    pub fn open_with(
        config: StoreConfig,
        grids: Arc<dyn GridRegistry>,
        hasher: Arc<dyn ParameterHasher>,
    ) -> Result<Self, StorageError> {
        config.validate().map_err(StorageError::InvalidConfig)?;
        let root = config.root.clone();

        check_suitability(&root, config.suitability)?;
        ensure_dir(&root)?;
        create_sentinel(&root)?;

        let tmp_dir = root.join(TMP_DIR_NAME);
        ensure_dir(&tmp_dir)?;
        let deleter = StagedDeleter::start(root.join(STAGING_DIR_NAME))?;

        let paths: Box<dyn PathGenerator> = match config.layout {
            Layout::Sharded => Box::new(ShardedPathGenerator::new(&root)),
            Layout::Xyz { convention } => Box::new(XyzPathGenerator::new(&root, grids, convention)),
        };

        let names = Arc::new(TempNameGenerator::new());
        let metadata = LayerMetadataStore::new(&root, &tmp_dir)
            .with_lock_shards(config.lock_shards)
            .with_max_attempts(config.metadata_max_attempts)
            .with_wait_after_rename(config.wait_after_rename())
            .with_temp_names(Arc::clone(&names));

        info!(root = %root.display(), layout = ?config.layout, "Opened file blob store");

        Ok(Self {
            root,
            tmp_dir,
            paths,
            metadata,
            deleter,
            listeners: ListenerList::new(),
            names,
            hasher,
            disk_block_size: config.disk_block_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that stores `key`.
    pub fn tile_path(&self, key: &TileKey) -> Result<PathBuf, StorageError> {
        self.paths.tile_path(key)
    }

    /// `size` rounded up to a whole number of disk blocks.
    pub fn pad_size(&self, size: u64) -> u64 {
        size.div_ceil(self.disk_block_size) * self.disk_block_size
    }

    // =========================================================================
    // Single Tiles
    // =========================================================================

    /// Store a tile, replacing any previous version.
    ///
    /// A blob carrying parameters but no parameters id gets the id derived
    /// from its parameters. Losing a race against a concurrent `put` of the
    /// same key is not an error.
    pub fn put(&self, blob: TileBlob) -> Result<(), StorageError> {
        let blob = self.assign_parameters_id(blob);
        let key = blob.key();
        let path = self.paths.tile_path(key)?;

        let old_size = file_len(&path)?;
        let outcome = self.write_tile(&path, &blob)?;

        if let (Some(id), Some(parameters)) = (key.parameters_id(), blob.parameters()) {
            self.persist_parameters(key.layer_name(), id, parameters)?;
        }

        if outcome == WriteOutcome::Superseded {
            debug!(path = %path.display(), "Tile write superseded by a concurrent put");
            return Ok(());
        }

        let padded = self.pad_size(blob.size());
        match old_size {
            Some(old) => self.listeners.send_tile_updated(key, padded, self.pad_size(old)),
            None => self.listeners.send_tile_stored(key, padded),
        }
        Ok(())
    }

    fn assign_parameters_id(&self, blob: TileBlob) -> TileBlob {
        if blob.key().parameters_id().is_some() {
            return blob;
        }
        match blob.parameters() {
            Some(parameters) if !parameters.is_empty() => {
                let id = self.hasher.id_for(parameters);
                let key = blob.key().clone().with_parameters_id(id);
                blob.with_key(key)
            }
            _ => blob,
        }
    }

    fn write_tile(&self, path: &Path, blob: &TileBlob) -> Result<WriteOutcome, StorageError> {
        let mut attempt = 1;
        loop {
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            match write_atomic(&self.tmp_dir, &self.names, path, blob.data(), blob.created()) {
                // a range delete pruned the directory between creating and renaming
                Err(e) if e.is_not_found() && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(
                        path = %path.display(),
                        attempt,
                        "Tile directory vanished during write, retrying"
                    );
                    ensure_dir(&self.tmp_dir)?;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Read a tile. A missing tile is `Ok(None)`.
    ///
    /// The returned blob's creation time is the file's modification time.
    pub fn get(&self, key: &TileKey) -> Result<Option<TileBlob>, StorageError> {
        let path = self.paths.tile_path(key)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let metadata = file.metadata().at(&path)?;
        let mut data = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut data).at(&path)?;

        let mut blob = TileBlob::new(key.clone(), data);
        if let Ok(modified) = metadata.modified() {
            blob = blob.with_created(modified);
        }
        Ok(Some(blob))
    }

    /// Delete a tile. Returns `false` if there was nothing to delete.
    pub fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        let path = self.paths.tile_path(key)?;
        let Some(size) = file_len(&path)? else {
            return Ok(false);
        };

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::io(&path, e)),
        }
        self.listeners.send_tile_deleted(key, self.pad_size(size));

        if let Some(parent) = path.parent() {
            remove_if_empty(parent);
        }
        Ok(true)
    }

    // =========================================================================
    // Bulk Deletes
    // =========================================================================

    /// Delete every stored tile of `range`, pruning emptied directories.
    ///
    /// A missing layer counts as success.
    pub fn delete_range(&self, range: &TileRange) -> Result<bool, StorageError> {
        let layer_dir = self.paths.layer_path(range.layer_name());
        if !layer_dir.exists() {
            return Ok(true);
        }

        let mut visitor = RangeDeleter {
            store: self,
            range,
            deleted: 0,
        };
        self.paths.visit_range(&layer_dir, range, &mut visitor)?;

        info!(
            layer = range.layer_name(),
            gridset = range.gridset_id(),
            deleted = visitor.deleted,
            "Deleted tile range"
        );
        Ok(true)
    }

    /// Delete a layer. Returns `false` if it did not exist.
    pub fn delete_layer(&self, layer_name: &str) -> Result<bool, StorageError> {
        let layer_dir = self.paths.layer_path(layer_name);
        let staged = self.deleter.stage(&layer_dir)?;
        if staged {
            info!(layer = layer_name, "Layer staged for deletion");
            self.listeners.send_layer_deleted(layer_name);
        }
        Ok(staged)
    }

    /// Delete every tile of a layer in one grid set.
    pub fn delete_by_gridset_id(&self, layer_name: &str, gridset_id: &str) -> Result<bool, StorageError> {
        let layer_dir = self.paths.layer_path(layer_name);
        let staged = self.stage_matching(&layer_dir, |name| self.paths.is_gridset_dir(gridset_id, name))?;
        if staged {
            info!(layer = layer_name, gridset = gridset_id, "Grid subset staged for deletion");
            self.listeners.send_grid_subset_deleted(layer_name, gridset_id);
        }
        Ok(staged)
    }

    /// Delete every tile of a layer with one parameters id.
    pub fn delete_by_parameters_id(&self, layer_name: &str, parameters_id: &str) -> Result<bool, StorageError> {
        let side_file = self.parameters_file(layer_name, parameters_id)?;
        let layer_dir = self.paths.layer_path(layer_name);
        let suffix = format!("_{}", parameters_id);
        let staged = self.stage_matching(&layer_dir, |name| name.ends_with(&suffix))?;

        match fs::remove_file(&side_file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&side_file, e)),
        }

        if staged {
            info!(layer = layer_name, parameters_id, "Parameter subset staged for deletion");
            self.listeners.send_parameters_deleted(layer_name, parameters_id);
        }
        Ok(staged)
    }

    fn stage_matching(&self, layer_dir: &Path, matches: impl Fn(&str) -> bool) -> Result<bool, StorageError> {
        let mut staged = false;
        for child in list_children(layer_dir)? {
            if child.is_dir && matches(&child.name) {
                staged |= self.deleter.stage(&child.path)?;
            }
        }
        Ok(staged)
    }

    /// Stage every layer for deletion.
    pub fn clear(&self) -> Result<(), StorageError> {
        for child in list_children(&self.root)? {
            if !child.is_dir || child.name == TMP_DIR_NAME || child.name == STAGING_DIR_NAME {
                continue;
            }
            if self.deleter.stage(&child.path)? {
                self.listeners.send_layer_deleted(&child.name);
            }
        }
        info!(root = %self.root.display(), "Cleared blob store");
        Ok(())
    }

    // =========================================================================
    // Layers
    // =========================================================================

    /// Rename a layer.
    ///
    /// Fails if the target exists. A missing source is not an error and
    /// still notifies listeners.
    pub fn rename(&self, old_layer_name: &str, new_layer_name: &str) -> Result<(), StorageError> {
        let old_dir = self.paths.layer_path(old_layer_name);
        let new_dir = self.paths.layer_path(new_layer_name);

        if new_dir.exists() {
            return Err(StorageError::AlreadyExists {
                from: old_dir,
                to: new_dir,
            });
        }

        if old_dir.exists() {
            if let Err(e) = fs::rename(&old_dir, &new_dir) {
                if new_dir.exists() {
                    return Err(StorageError::AlreadyExists {
                        from: old_dir,
                        to: new_dir,
                    });
                }
                return Err(StorageError::io(&old_dir, e));
            }
            info!(from = old_layer_name, to = new_layer_name, "Renamed layer");
        }

        self.listeners.send_layer_renamed(old_layer_name, new_layer_name);
        Ok(())
    }

    pub fn layer_exists(&self, layer_name: &str) -> bool {
        self.paths.layer_path(layer_name).is_dir()
    }

    /// Number of tiles of a layer and their size padded to the disk block size.
    pub fn layer_cache_size(&self, layer_name: &str) -> Result<CacheUsage, StorageError> {
        let layer_dir = self.paths.layer_path(layer_name);
        let mut usage = CacheUsage::default();

        // files directly in the layer directory are metadata, not tiles
        let mut pending: Vec<PathBuf> = list_children(&layer_dir)?
            .into_iter()
            .filter(|c| c.is_dir)
            .map(|c| c.path)
            .collect();

        while let Some(dir) = pending.pop() {
            for child in list_children(&dir)? {
                if child.is_dir {
                    pending.push(child.path);
                    continue;
                }
                if let Some(size) = file_len(&child.path)? {
                    usage.tiles += 1;
                    usage.bytes += self.pad_size(size);
                }
            }
        }
        Ok(usage)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Read one metadata entry of a layer.
    pub fn get_layer_metadata(&self, layer_name: &str, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.metadata.get_entry(layer_name, key)?.into_inner())
    }

    /// Set one metadata entry of a layer, or remove it when `value` is `None`.
    pub fn put_layer_metadata(
        &self,
        layer_name: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<MetadataWrite, StorageError> {
        self.metadata.put_entry(layer_name, key, value)
    }

    /// Every metadata entry of a layer.
    pub fn layer_metadata(&self, layer_name: &str) -> Result<BTreeMap<String, String>, StorageError> {
        Ok(self.metadata.get_layer_metadata(layer_name)?.into_inner())
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    fn parameters_file(&self, layer_name: &str, parameters_id: &str) -> Result<PathBuf, StorageError> {
        let parameters_id = check_parameters_id(parameters_id)?;
        Ok(self.paths.layer_path(layer_name).join(format!(
            "{}{}{}",
            PARAMETERS_FILE_PREFIX, parameters_id, PARAMETERS_FILE_SUFFIX
        )))
    }

    /// Write the side file of a parameters id unless it already exists.
    fn persist_parameters(
        &self,
        layer_name: &str,
        parameters_id: &str,
        parameters: &ParameterSet,
    ) -> Result<(), StorageError> {
        let file = self.parameters_file(layer_name, parameters_id)?;
        if file.exists() {
            return Ok(());
        }

        let props: Properties = parameters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let outcome = write_atomic_with(&self.tmp_dir, &self.names, &file, |out| {
            properties::write_plain(&props, out)
        })?;
        debug!(path = %file.display(), ?outcome, "Persisted parameters");
        Ok(())
    }

    /// Parameters ids with tiles in a layer.
    pub fn get_parameter_ids(&self, layer_name: &str) -> Result<BTreeSet<String>, StorageError> {
        let layer_dir = self.paths.layer_path(layer_name);
        let id_len = self.hasher.id_len();
        Ok(list_children(&layer_dir)?
            .into_iter()
            .filter(|c| c.is_dir)
            .filter_map(|c| parameters_id_from_dir_name(&c.name, id_len).map(str::to_string))
            .collect())
    }

    /// Parameters ids of a layer with their parameters, where known.
    pub fn get_parameters_mapping(
        &self,
        layer_name: &str,
    ) -> Result<BTreeMap<String, Option<ParameterSet>>, StorageError> {
        let mut mapping = BTreeMap::new();
        for id in self.get_parameter_ids(layer_name)? {
            let parameters = self.load_parameters(layer_name, &id)?;
            mapping.insert(id, parameters);
        }
        Ok(mapping)
    }

    fn load_parameters(&self, layer_name: &str, parameters_id: &str) -> Result<Option<ParameterSet>, StorageError> {
        let file = self.parameters_file(layer_name, parameters_id)?;
        match properties::read_plain(&file) {
            Ok(props) => return Ok(Some(ParameterSet::from(props))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&file, e)),
        }

        let legacy_key = format!("{}{}", LEGACY_PARAMETERS_KEY_PREFIX, parameters_id);
        let legacy = self.metadata.get_entry(layer_name, &legacy_key)?.into_inner();
        Ok(legacy.map(|kvp| ParameterSet::from_kvp(&kvp)))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn add_listener(&self, listener: Arc<dyn BlobStoreListener>) {
        self.listeners.add(listener);
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn BlobStoreListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Finish pending background deletions and stop the deletion worker.
    ///
    /// Bulk deletes fail with [`StorageError::WorkerUnavailable`] afterwards.
    pub fn close(&self) {
        self.deleter.close();
        info!(root = %self.root.display(), "Closed file blob store");
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct RangeDeleter<'a> {
    store: &'a FileBlobStore,
    range: &'a TileRange,
    deleted: u64,
}

impl TileFileVisitor for RangeDeleter<'_> {
    fn visit_file(&mut self, file: &Path, x: i64, y: i64, z: i32) -> Result<(), StorageError> {
        let Some(size) = file_len(file)? else {
            return Ok(());
        };
        match fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(file, e)),
        }

        let range = self.range;
        let mut key = TileKey::new(range.layer_name(), range.gridset_id(), (x, y, z), range.format());
        if let Some(id) = range.parameters_id() {
            key = key.with_parameters_id(id);
        }
        self.store
            .listeners
            .send_tile_deleted(&key, self.store.pad_size(size));
        self.deleted += 1;
        Ok(())
    }
}

/// Length of a file, `None` if it does not exist.
fn file_len(path: &Path) -> Result<Option<u64>, StorageError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn check_suitability(root: &Path, check: SuitabilityCheck) -> Result<(), StorageError> {
    match fs::metadata(root) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(StorageError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StorageError::io(root, e)),
    }

    let is_empty = fs::read_dir(root).at(root)?.next().is_none();
    let unsuitable = |reason: &str| StorageError::Unsuitable {
        path: root.to_path_buf(),
        check: check.name(),
        reason: reason.to_string(),
    };

    match check {
        SuitabilityCheck::None => Ok(()),
        SuitabilityCheck::Empty if is_empty => Ok(()),
        SuitabilityCheck::Empty => Err(unsuitable("directory is not empty")),
        SuitabilityCheck::Existing if is_empty || root.join(METADATA_FILE_NAME).exists() => Ok(()),
        SuitabilityCheck::Existing => Err(unsuitable(
            "directory is not empty and does not contain metadata.properties",
        )),
    }
}

fn create_sentinel(root: &Path) -> Result<(), StorageError> {
    let sentinel = root.join(METADATA_FILE_NAME);
    match OpenOptions::new().create(true).append(true).open(&sentinel) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(StorageError::NotWritable {
            path: root.to_path_buf(),
        }),
        Err(e) => Err(StorageError::io(&sentinel, e)),
    }
}
