//! Write-then-rename protocol and temporary file naming.
//!
//! A blob is never written in place. It goes to a fresh file under the
//! store's scratch directory and is then renamed over its final path, so a
//! concurrent reader sees either the old file, the new file, or nothing.
//!
//! ```text
//! write  tmp/<base>-<n>      (full payload, mtime set)
//! rename tmp/<base>-<n> -> <target>
//!   fails and <target> existed before?  remove <target>, rename once more
//! tmp/<base>-<n> still there?           another writer won, drop ours
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{IoResultExt, StorageError};

/// Number of names handed out before a new random base is drawn.
pub const TEMP_NAME_ROLLOVER: u32 = 10_000;

// =============================================================================
// Temp Name Generator
// =============================================================================

/// Produces unique temporary file names: a random base plus a counter.
#[derive(Debug)]
pub struct TempNameGenerator {
    state: Mutex<TempNameState>,
}

#[derive(Debug)]
struct TempNameState {
    base: String,
    counter: u32,
}

impl TempNameGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TempNameState {
                base: random_base(),
                counter: 0,
            }),
        }
    }

    /// Next unique name.
    pub fn next_name(&self) -> String {
        let mut state = self.state.lock();
        if state.counter >= TEMP_NAME_ROLLOVER {
            state.base = random_base();
            state.counter = 0;
        }
        state.counter += 1;
        format!("{}-{}", state.base, state.counter)
    }
}

impl Default for TempNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_base() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Atomic Write
// =============================================================================

/// Result of an atomic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Our file is now at the target path
    Committed,
    /// A concurrent writer produced the target first; our data was discarded
    Superseded,
}

/// Write `data` to `target` through a temporary file in `tmp_dir`.
///
/// `modified`, when given, becomes the file's modification time. The parent
/// of `target` must exist.
pub fn write_atomic(
    tmp_dir: &Path,
    names: &TempNameGenerator,
    target: &Path,
    data: &[u8],
    modified: Option<SystemTime>,
) -> Result<WriteOutcome, StorageError> {
    let temp = tmp_dir.join(names.next_name());
    write_temp(&temp, data, modified)?;
    commit(&temp, target)
}

/// Like [`write_atomic`], with the payload produced by `fill`.
pub fn write_atomic_with<F>(
    tmp_dir: &Path,
    names: &TempNameGenerator,
    target: &Path,
    fill: F,
) -> Result<WriteOutcome, StorageError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let temp = tmp_dir.join(names.next_name());
    let mut file = File::create(&temp).at(&temp)?;
    if let Err(e) = fill(&mut file) {
        drop(file);
        let _ = fs::remove_file(&temp);
        return Err(StorageError::io(&temp, e));
    }
    drop(file);
    commit(&temp, target)
}

fn write_temp(temp: &Path, data: &[u8], modified: Option<SystemTime>) -> Result<(), StorageError> {
    let result: io::Result<()> = (|| {
        let mut file = File::create(temp)?;
        file.write_all(data)?;
        if let Some(time) = modified {
            file.set_modified(time)?;
        }
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(temp);
    }
    result.at(temp)
}

fn commit(temp: &Path, target: &Path) -> Result<WriteOutcome, StorageError> {
    let target_existed = target.exists();
    let renamed = rename_file(temp, target, target_existed);

    if !temp.exists() {
        return Ok(WriteOutcome::Committed);
    }

    let _ = fs::remove_file(temp);
    match renamed {
        Err(_) if target.exists() => {
            debug!(path = %target.display(), "Concurrent writer committed first, discarding temp file");
            Ok(WriteOutcome::Superseded)
        }
        Err(e) => Err(StorageError::io(target, e)),
        Ok(()) => Ok(WriteOutcome::Superseded),
    }
}

/// Rename `src` over `dst`, removing `dst` and retrying once when the
/// filesystem refuses to replace an existing file.
pub(crate) fn rename_file(src: &Path, dst: &Path, dst_existed: bool) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if dst_existed => {
            debug!(path = %dst.display(), error = %e, "Rename over existing file failed, retrying");
            match fs::remove_file(dst) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            fs::rename(src, dst)
        }
        Err(e) => Err(e),
    }
}
