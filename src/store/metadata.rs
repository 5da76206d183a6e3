//! Per-layer key/value metadata.
//!
//! Each layer keeps one small property file, `<layer>/metadata.properties.gz`,
//! whose values are URL-encoded. Older stores wrote an uncompressed
//! `<layer>/metadata.properties`; it is converted on first access.
//!
//! # Concurrency
//!
//! Within a process, every file maps to one of a fixed set of read/write
//! locks ([`LockShards`]). Across processes nothing is locked: readers retry
//! while the file's modification time moves under them, and writers
//! re-read after their rename to check that their update survived.
//!
//! ```text
//! put_entry:
//!   loop (max attempts)
//!     read props + mtime
//!     apply mutation
//!     mtime moved?           -> retry
//!     write tmp, rename over file
//!     sleep wait_after_rename
//!     re-read, key as intended? -> done
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::{IoResultExt, StorageError};
use crate::path::{ensure_dir, filtered_layer_name};

use super::atomic::{write_atomic_with, TempNameGenerator, WriteOutcome};
use super::locks::{LockShards, DEFAULT_LOCK_SHARDS};
use super::properties::{self, Properties};
use super::retry::{retry_bounded, Attempt, MetadataWrite, ReadOutcome, Retried};

/// Legacy uncompressed metadata file name, also the store root sentinel.
pub const METADATA_FILE_NAME: &str = "metadata.properties";

/// Compressed metadata file name.
pub const METADATA_GZIP_FILE_NAME: &str = "metadata.properties.gz";

/// Default number of read or write attempts.
pub const DEFAULT_METADATA_MAX_ATTEMPTS: u32 = 10;

/// Default pause between a rename and its verification.
pub const DEFAULT_WAIT_AFTER_RENAME: Duration = Duration::from_millis(10);

/// Persistent per-layer metadata.
#[derive(Debug)]
pub struct LayerMetadataStore {
    root: PathBuf,
    tmp_dir: PathBuf,
    locks: LockShards,
    names: Arc<TempNameGenerator>,
    max_attempts: u32,
    wait_after_rename: Duration,
}

impl LayerMetadataStore {
    /// Create a store for layers under `root`, staging writes in `tmp_dir`.
    pub fn new(root: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_dir: tmp_dir.into(),
            locks: LockShards::new(DEFAULT_LOCK_SHARDS),
            names: Arc::new(TempNameGenerator::new()),
            max_attempts: DEFAULT_METADATA_MAX_ATTEMPTS,
            wait_after_rename: DEFAULT_WAIT_AFTER_RENAME,
        }
    }

    pub fn with_lock_shards(mut self, count: usize) -> Self {
        self.locks = LockShards::new(count);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_wait_after_rename(mut self, wait: Duration) -> Self {
        self.wait_after_rename = wait;
        self
    }

    /// Share a temp name generator with other writers of the same scratch directory.
    pub fn with_temp_names(mut self, names: Arc<TempNameGenerator>) -> Self {
        self.names = names;
        self
    }

    pub fn metadata_file(&self, layer_name: &str) -> PathBuf {
        self.layer_dir(layer_name).join(METADATA_GZIP_FILE_NAME)
    }

    fn layer_dir(&self, layer_name: &str) -> PathBuf {
        self.root.join(filtered_layer_name(layer_name))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All entries of a layer, values URL-decoded. A missing file is empty.
    pub fn get_layer_metadata(
        &self,
        layer_name: &str,
    ) -> Result<ReadOutcome<BTreeMap<String, String>>, StorageError> {
        let file = self.resolve_metadata_file(layer_name)?;
        let outcome = self.load(&file)?;
        Ok(outcome.map(|props| {
            props
                .into_iter()
                .map(|(key, value)| {
                    let decoded = decode_value(&value);
                    (key, decoded)
                })
                .collect()
        }))
    }

    /// One entry of a layer, URL-decoded.
    pub fn get_entry(
        &self,
        layer_name: &str,
        key: &str,
    ) -> Result<ReadOutcome<Option<String>>, StorageError> {
        let file = self.resolve_metadata_file(layer_name)?;
        let outcome = self.load(&file)?;
        Ok(outcome.map(|props| props.get(key).map(|v| decode_value(v))))
    }

    fn load(&self, file: &Path) -> Result<ReadOutcome<Properties>, StorageError> {
        let _guard = self.locks.read(file);
        self.load_unlocked(file)
    }

    fn load_unlocked(&self, file: &Path) -> Result<ReadOutcome<Properties>, StorageError> {
        let outcome = retry_bounded(self.max_attempts, |_| {
            let Some(before) = modified(file)? else {
                return Ok(Attempt::Done(Properties::new()));
            };
            let props = match properties::read_gzip(file) {
                Ok(props) => props,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Properties::new(),
                Err(e) => return Err(StorageError::io(file, e)),
            };
            if modified(file)? == Some(before) {
                Ok(Attempt::Done(props))
            } else {
                debug!(path = %file.display(), "Metadata file changed while reading, retrying");
                Ok(Attempt::Retry(props))
            }
        })?;

        Ok(match outcome {
            Retried::Done(props) => ReadOutcome::Fresh(props),
            Retried::Exhausted(last) => {
                warn!(
                    path = %file.display(),
                    attempts = self.max_attempts,
                    "Metadata file kept changing while reading, returning possibly stale data"
                );
                ReadOutcome::Stale(last.unwrap_or_default())
            }
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set `key` to `value`, or remove it when `value` is `None`.
    pub fn put_entry(
        &self,
        layer_name: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<MetadataWrite, StorageError> {
        let file = self.resolve_metadata_file(layer_name)?;
        let encoded = value.map(|v| urlencoding::encode(v).into_owned());

        let _guard = self.locks.write(&file);
        if let Some(parent) = file.parent() {
            ensure_dir(parent)?;
        }
        ensure_dir(&self.tmp_dir)?;

        let mut wrote = false;
        let outcome = retry_bounded(self.max_attempts, |attempt| {
            let before = modified(&file)?;
            let mut props = self.load_unlocked(&file)?.into_inner();
            if props.get(key) == encoded.as_ref() {
                return Ok(Attempt::Done(if wrote {
                    MetadataWrite::Committed
                } else {
                    MetadataWrite::Unchanged
                }));
            }

            match &encoded {
                Some(v) => props.insert(key.to_string(), v.clone()),
                None => props.remove(key),
            };

            if modified(&file)? != before {
                debug!(path = %file.display(), attempt, "Metadata timestamp changed, retrying write");
                return Ok(Attempt::Retry(MetadataWrite::Exhausted));
            }

            let written = write_atomic_with(&self.tmp_dir, &self.names, &file, |out| {
                properties::write_gzip(&props, out)
            })?;
            wrote = true;
            if written == WriteOutcome::Superseded {
                debug!(path = %file.display(), attempt, "Metadata rename lost to another writer");
                return Ok(Attempt::Retry(MetadataWrite::Exhausted));
            }

            std::thread::sleep(self.wait_after_rename);

            let current = self.load_unlocked(&file)?.into_inner();
            if current.get(key) == encoded.as_ref() {
                Ok(Attempt::Done(MetadataWrite::Committed))
            } else {
                debug!(path = %file.display(), attempt, "Metadata update overwritten by another writer, retrying");
                Ok(Attempt::Retry(MetadataWrite::Exhausted))
            }
        })?;

        Ok(match outcome {
            Retried::Done(result) => result,
            Retried::Exhausted(_) => {
                warn!(
                    layer = layer_name,
                    key,
                    attempts = self.max_attempts,
                    "Giving up on metadata update after repeated concurrent modifications"
                );
                MetadataWrite::Exhausted
            }
        })
    }

    // =========================================================================
    // Legacy Upgrade
    // =========================================================================

    fn resolve_metadata_file(&self, layer_name: &str) -> Result<PathBuf, StorageError> {
        let layer_dir = self.layer_dir(layer_name);
        let file = layer_dir.join(METADATA_GZIP_FILE_NAME);
        if !file.exists() {
            self.upgrade_legacy_file(&layer_dir, &file)?;
        }
        Ok(file)
    }

    fn upgrade_legacy_file(&self, layer_dir: &Path, new_file: &Path) -> Result<(), StorageError> {
        let old_file = layer_dir.join(METADATA_FILE_NAME);
        if !old_file.exists() {
            return Ok(());
        }

        let _guards = self.locks.write_pair(&old_file, new_file);
        if !old_file.exists() {
            return Ok(());
        }

        info!(path = %old_file.display(), "Upgrading legacy layer metadata file");
        if !new_file.exists() {
            let props = properties::read_plain(&old_file).at(&old_file)?;
            ensure_dir(&self.tmp_dir)?;
            write_atomic_with(&self.tmp_dir, &self.names, new_file, |out| {
                properties::write_gzip(&props, out)
            })?;
        }
        match fs::remove_file(&old_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&old_file, e)),
        }
    }
}

fn decode_value(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn modified(path: &Path) -> Result<Option<SystemTime>, StorageError> {
    match fs::metadata(path) {
        Ok(metadata) => metadata.modified().map(Some).at(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
