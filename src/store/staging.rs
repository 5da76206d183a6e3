//! Staged directory deletion.
//!
//! Removing a layer can mean millions of files, so the facade never deletes
//! a subtree in the caller's thread. The directory is first renamed into the
//! staging area, which takes it out of the live tree at once, and a single
//! background worker then removes it file by file.
//!
//! ```text
//! <root>/africa  --rename-->  <root>/_gwc_in_progress_deletes_/africa[.N]
//!                                          |
//!                              deleter thread (FIFO queue)
//! ```
//!
//! A staged directory that was not fully removed, because the process died or
//! the worker was cancelled, is still in the staging area at the next start
//! and is queued again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IoResultExt, StorageError};
use crate::path::{ensure_dir, list_children};

/// Name of the staging directory under the store root.
pub const STAGING_DIR_NAME: &str = "_gwc_in_progress_deletes_";

/// Renames directories into the staging area and deletes them in the background.
#[derive(Debug)]
pub struct StagedDeleter {
    staging_dir: PathBuf,
    sender: Mutex<Option<UnboundedSender<PathBuf>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    stage_lock: Mutex<()>,
}

impl StagedDeleter {
    /// Start the worker and queue every leftover entry of `staging_dir`.
    pub fn start(staging_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let staging_dir = staging_dir.into();
        ensure_dir(&staging_dir)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let worker = std::thread::Builder::new()
            .name("tile-store-deleter".to_string())
            .spawn(move || run_worker(receiver, worker_cancel))
            .at(&staging_dir)?;

        let leftovers = list_children(&staging_dir)?;
        if !leftovers.is_empty() {
            info!(
                count = leftovers.len(),
                "Resuming deletion of directories staged by a previous run"
            );
        }
        for child in leftovers {
            // receiver is alive until the worker exits
            let _ = sender.send(child.path);
        }

        Ok(Self {
            staging_dir,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            cancel,
            stage_lock: Mutex::new(()),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Move `dir` into the staging area and queue it for deletion.
    ///
    /// Returns `false` when `dir` does not exist.
    pub fn stage(&self, dir: &Path) -> Result<bool, StorageError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(StorageError::WorkerUnavailable)?;

        let staged = {
            let _guard = self.stage_lock.lock();
            match self.rename_into_staging(dir)? {
                Some(staged) => staged,
                None => return Ok(false),
            }
        };

        debug!(from = %dir.display(), to = %staged.display(), "Staged directory for deletion");
        if sender.send(staged).is_err() {
            warn!(
                path = %dir.display(),
                "Deletion worker stopped; staged directory will be removed at next start"
            );
        }
        Ok(true)
    }

    fn rename_into_staging(&self, dir: &Path) -> Result<Option<PathBuf>, StorageError> {
        if !dir.exists() {
            return Ok(None);
        }
        let base = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "staged".to_string());

        let mut target = self.staging_dir.join(&base);
        let mut suffix = 0_u32;
        loop {
            if !target.exists() {
                match fs::rename(dir, &target) {
                    Ok(()) => return Ok(Some(target)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound && !dir.exists() => {
                        return Ok(None)
                    }
                    // another process took this name first
                    Err(_) if target.exists() => {}
                    Err(e) => return Err(StorageError::io(dir, e)),
                }
            }
            suffix += 1;
            target = self.staging_dir.join(format!("{}.{}", base, suffix));
        }
    }

    /// Request the worker to stop; a deletion in progress is abandoned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Finish every queued deletion and stop the worker.
    pub fn close(&self) {
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Deletion worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl Drop for StagedDeleter {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.close();
    }
}

fn run_worker(mut receiver: UnboundedReceiver<PathBuf>, cancel: CancellationToken) {
    while let Some(dir) = receiver.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        match remove_tree(&dir, &cancel) {
            Ok(true) => debug!(path = %dir.display(), "Removed staged directory"),
            Ok(false) => {
                info!(path = %dir.display(), "Deletion interrupted, will resume at next start");
                break;
            }
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove staged directory"),
        }
    }
    debug!("Deletion worker exiting");
}

/// Remove `path` depth-first. Returns `Ok(false)` if cancelled midway.
pub(crate) fn remove_tree(path: &Path, cancel: &CancellationToken) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    if !metadata.is_dir() {
        return ignore_not_found(fs::remove_file(path)).map(|_| true);
    }

    for entry in fs::read_dir(path)? {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if !remove_tree(&entry.path(), cancel)? {
                return Ok(false);
            }
        } else {
            ignore_not_found(fs::remove_file(entry.path()))?;
        }
    }
    ignore_not_found(fs::remove_dir(path))?;
    Ok(true)
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
