//! Staged deletion integration tests.
//!
//! Tests verify:
//! - Bulk deletes hide data immediately and remove it in the background
//! - Deletions interrupted by a crash are finished on the next open
//! - The store refuses bulk deletes once closed

use std::fs;
use std::time::Duration;

use tile_store::store::{StagedDeleter, STAGING_DIR_NAME};
use tile_store::{StorageError, TileBlob};

use super::test_utils::{africa, count_files, open_sharded, wait_until};

#[test]
fn test_deleted_layer_is_hidden_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    for x in 0..8 {
        store.put(TileBlob::new(africa(x, 0, 3), &b"t"[..])).unwrap();
    }

    assert!(store.delete_layer("africa").unwrap());
    assert!(!store.layer_exists("africa"));
    for x in 0..8 {
        assert!(store.get(&africa(x, 0, 3)).unwrap().is_none());
    }

    let staging = dir.path().join(STAGING_DIR_NAME);
    assert!(wait_until(Duration::from_secs(5), || count_files(&staging) == 0));
    store.close();
    assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
}

#[test]
fn test_layer_can_be_recreated_while_deleting() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put(TileBlob::new(africa(0, 0, 0), &b"old"[..])).unwrap();

    store.delete_layer("africa").unwrap();
    store.put(TileBlob::new(africa(0, 0, 0), &b"new"[..])).unwrap();
    store.close();

    let blob = store.get(&africa(0, 0, 0)).unwrap().unwrap();
    assert_eq!(blob.data().as_ref(), b"new");
}

#[test]
fn test_crash_leftovers_are_removed_on_open() {
    let dir = tempfile::tempdir().unwrap();

    // a previous process staged a layer and died before removing it
    let staged = dir.path().join(STAGING_DIR_NAME).join("africa");
    fs::create_dir_all(staged.join("EPSG_4326_01/0_0")).unwrap();
    for name in ["00_00.png", "01_00.png", "02_01.png"] {
        fs::write(staged.join("EPSG_4326_01/0_0").join(name), b"t").unwrap();
    }
    fs::write(dir.path().join("metadata.properties"), b"").unwrap();

    let store = open_sharded(dir.path());
    assert!(store.get(&africa(0, 0, 1)).unwrap().is_none());
    store.close();

    assert!(!staged.exists());
}

#[test]
fn test_dropped_store_resumes_on_next_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_sharded(dir.path());
        for x in 0..16 {
            store.put(TileBlob::new(africa(x, 0, 4), &b"t"[..])).unwrap();
        }
        store.delete_layer("africa").unwrap();
        // dropped without close: the worker is cancelled, maybe mid-way
    }

    let store = open_sharded(dir.path());
    store.close();
    assert_eq!(count_files(&dir.path().join(STAGING_DIR_NAME)), 0);
    assert!(!store.layer_exists("africa"));
}

#[test]
fn test_closed_store_rejects_bulk_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put(TileBlob::new(africa(0, 0, 0), &b"t"[..])).unwrap();
    store.close();

    let err = store.delete_layer("africa").unwrap_err();
    assert!(matches!(err, StorageError::WorkerUnavailable));
    assert!(store.layer_exists("africa"));

    // single tiles do not need the worker
    assert!(store.delete(&africa(0, 0, 0)).unwrap());
}

#[test]
fn test_deleter_collision_names() {
    let dir = tempfile::tempdir().unwrap();
    let deleter = StagedDeleter::start(dir.path().join(STAGING_DIR_NAME)).unwrap();

    for _ in 0..3 {
        let layer = dir.path().join("layers").join("africa");
        fs::create_dir_all(layer.join("z")).unwrap();
        fs::write(layer.join("z/tile.png"), b"t").unwrap();
        assert!(deleter.stage(&layer).unwrap());
        assert!(!layer.exists());
    }

    deleter.close();
    assert!(!deleter.is_running());
    assert_eq!(fs::read_dir(deleter.staging_dir()).unwrap().count(), 0);
}
