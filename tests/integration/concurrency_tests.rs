//! Concurrent tile access integration tests.
//!
//! Tests verify:
//! - Concurrent puts to one key leave exactly one complete blob
//! - Readers never observe a partially written tile
//! - Writers survive range deletes pruning their directories
//! - No temp files are left behind

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tile_store::{RangeBounds, TileBlob, TileRange};

use super::test_utils::{africa, count_files, open_sharded, payload};

/// Payload `i` is `1000 + i` bytes of value `i`, so any blob can be checked
/// for completeness on its own.
fn numbered(i: u8) -> Vec<u8> {
    payload(i, 1000 + usize::from(i))
}

fn assert_complete(data: &[u8]) {
    let first = data[0];
    assert_eq!(data.len(), 1000 + usize::from(first), "truncated blob");
    assert!(data.iter().all(|&b| b == first), "mixed blob");
}

#[test]
fn test_concurrent_puts_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_sharded(dir.path()));
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (1..=writers as u8)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.put(TileBlob::new(africa(10, 50, 5), numbered(i))).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let blob = store.get(&africa(10, 50, 5)).unwrap().unwrap();
    assert_complete(blob.data());
    assert_eq!(count_files(&dir.path().join("tmp")), 0);
}

#[test]
fn test_readers_never_see_partial_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_sharded(dir.path()));
    store.put(TileBlob::new(africa(1, 1, 1), numbered(1))).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reads = 0;
            while !done.load(Ordering::SeqCst) {
                if let Some(blob) = store.get(&africa(1, 1, 1)).unwrap() {
                    assert_complete(blob.data());
                    reads += 1;
                }
            }
            reads
        })
    };

    let writers: Vec<_> = (0..4_u8)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..50_u8 {
                    let value = 1 + (w * 50 + round) % 250;
                    store.put(TileBlob::new(africa(1, 1, 1), numbered(value))).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);

    assert!(reader.join().unwrap() > 0);
}

#[test]
fn test_puts_survive_concurrent_range_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_sharded(dir.path()));
    let barrier = Arc::new(Barrier::new(2));

    let deleter = {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            // column 0 only; columns 1..3 share its shard directory
            let range = TileRange::new("africa", "EPSG:4326", 2, 2, "image/png")
                .unwrap()
                .with_bounds(2, RangeBounds::new(0, 0, 0, 3));
            barrier.wait();
            for _ in 0..200 {
                store.delete_range(&range).unwrap();
            }
        })
    };

    barrier.wait();
    for round in 0..200 {
        let x = 1 + (round % 3);
        store.put(TileBlob::new(africa(x, 0, 2), &b"t"[..])).unwrap();
        store.put(TileBlob::new(africa(0, 1, 2), &b"t"[..])).unwrap();
    }
    deleter.join().unwrap();

    for x in 1..4 {
        assert!(store.get(&africa(x, 0, 2)).unwrap().is_some());
    }
    assert_eq!(count_files(&dir.path().join("tmp")), 0);
}

#[test]
fn test_parallel_layers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open_sharded(dir.path()));

    let handles: Vec<_> = ["africa", "europe", "asia", "oceania"]
        .into_iter()
        .map(|layer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for x in 0..16 {
                    let key = tile_store::TileKey::new(layer, "EPSG:4326", (x, 0, 3), "image/png");
                    store.put(TileBlob::new(key, &b"t"[..])).unwrap();
                }
                store.delete_layer(layer).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    store.close();
    for layer in ["africa", "europe", "asia", "oceania"] {
        assert!(!store.layer_exists(layer));
    }
    assert_eq!(
        fs::read_dir(dir.path().join("_gwc_in_progress_deletes_"))
            .unwrap()
            .count(),
        0
    );
}
