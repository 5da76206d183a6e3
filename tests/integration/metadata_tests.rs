//! Layer metadata integration tests.
//!
//! Tests verify:
//! - Metadata survives reopening the store
//! - Independent stores over one root converge on concurrent updates
//! - Legacy uncompressed metadata is upgraded in place

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tile_store::store::{
    properties, LayerMetadataStore, MetadataWrite, METADATA_FILE_NAME, METADATA_GZIP_FILE_NAME,
};
use tile_store::TileBlob;

use super::test_utils::{africa, open_sharded};

fn metadata_store(root: &std::path::Path) -> LayerMetadataStore {
    LayerMetadataStore::new(root, root.join("tmp"))
        .with_wait_after_rename(Duration::from_millis(5))
        .with_max_attempts(50)
}

#[test]
fn test_metadata_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put(TileBlob::new(africa(0, 0, 0), &b"t"[..])).unwrap();

    assert_eq!(
        store.put_layer_metadata("africa", "title", Some("Africa = 54 countries")).unwrap(),
        MetadataWrite::Committed
    );
    assert_eq!(
        store.put_layer_metadata("africa", "title", Some("Africa = 54 countries")).unwrap(),
        MetadataWrite::Unchanged
    );
    store.close();
    drop(store);

    let store = open_sharded(dir.path());
    assert_eq!(
        store.get_layer_metadata("africa", "title").unwrap().as_deref(),
        Some("Africa = 54 countries")
    );
    assert_eq!(store.get_layer_metadata("africa", "missing").unwrap(), None);

    store.put_layer_metadata("africa", "title", None).unwrap();
    assert!(store.layer_metadata("africa").unwrap().is_empty());
}

#[test]
fn test_values_are_url_encoded_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put_layer_metadata("africa", "bbox", Some("-20,-35 55,38")).unwrap();

    let file = dir.path().join("africa").join(METADATA_GZIP_FILE_NAME);
    let raw = properties::read_gzip(&file).unwrap();
    assert_eq!(raw.get("bbox").map(String::as_str), Some("-20%2C-35%2055%2C38"));
}

#[test]
fn test_metadata_follows_rename() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put_layer_metadata("africa", "owner", Some("ops")).unwrap();

    store.rename("africa", "afrique").unwrap();
    assert_eq!(
        store.get_layer_metadata("afrique", "owner").unwrap().as_deref(),
        Some("ops")
    );
    assert_eq!(store.get_layer_metadata("africa", "owner").unwrap(), None);
}

#[test]
fn test_legacy_metadata_is_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let layer = dir.path().join("africa");
    fs::create_dir_all(&layer).unwrap();
    fs::write(
        layer.join(METADATA_FILE_NAME),
        "#legacy\ntitle=Old%20Africa\nparameters.abc=STYLES%3Dx\n",
    )
    .unwrap();

    let store = open_sharded(dir.path());
    let all = store.layer_metadata("africa").unwrap();
    assert_eq!(all.get("title").map(String::as_str), Some("Old Africa"));
    assert_eq!(all.get("parameters.abc").map(String::as_str), Some("STYLES=x"));

    assert!(!layer.join(METADATA_FILE_NAME).exists());
    assert!(layer.join(METADATA_GZIP_FILE_NAME).is_file());
}

#[test]
fn test_two_stores_converge() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["alpha", "beta"]
        .into_iter()
        .map(|key| {
            let root = root.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // separate lock tables, like two processes
                let store = metadata_store(&root);
                barrier.wait();
                for round in 0..5 {
                    let value = format!("{}-{}", key, round);
                    let outcome = store.put_entry("africa", key, Some(&value)).unwrap();
                    assert_ne!(outcome, MetadataWrite::Exhausted);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for store in [metadata_store(&root), metadata_store(&root)] {
        let all = store.get_layer_metadata("africa").unwrap().into_inner();
        assert_eq!(all.get("alpha").map(String::as_str), Some("alpha-4"));
        assert_eq!(all.get("beta").map(String::as_str), Some("beta-4"));
    }
}

#[test]
fn test_many_threads_one_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_sharded(dir.path()));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .put_layer_metadata("africa", &format!("key{}", i), Some("v"))
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), MetadataWrite::Committed);
    }

    assert_eq!(store.layer_metadata("africa").unwrap().len(), 6);
}
