//! Range deletion integration tests.
//!
//! Tests verify:
//! - Exactly the tiles inside a range's rectangles are deleted
//! - Zoom windows, parameters ids and formats narrow a range
//! - The XYZ layout reports and filters rows in TMS order
//! - Foreign files in the cache tree are left alone
//! - Randomized ranges delete the same tiles `TileRange::contains` selects

use std::collections::BTreeSet;
use std::fs;

use tile_store::path::Convention;
use tile_store::{FileBlobStore, RangeBounds, TileBlob, TileKey, TileRange};

use super::test_utils::{africa, count_files, open_sharded, open_xyz, Event, RecordingListener};

/// Store every tile of zoom `z` in the `EPSG:4326` grid (2^(z+1) x 2^z tiles).
fn fill_zoom(store: &FileBlobStore, z: i32) {
    for x in 0..(2_i64 << z) {
        for y in 0..(1_i64 << z) {
            store.put(TileBlob::new(africa(x, y, z), &b"t"[..])).unwrap();
        }
    }
}

fn deleted_coords(events: &[Event]) -> BTreeSet<(i64, i64, i32)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Deleted { key, .. } => Some(key.xyz()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_rectangle_deletes_exactly_inside() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    fill_zoom(&store, 3);
    let listener = RecordingListener::attach(&store);

    let range = TileRange::new("africa", "EPSG:4326", 3, 3, "image/png")
        .unwrap()
        .with_bounds(3, RangeBounds::new(9, 2, 12, 5));
    assert!(store.delete_range(&range).unwrap());

    let expected: BTreeSet<_> = (9..=12)
        .flat_map(|x| (2..=5).map(move |y| (x, y, 3)))
        .collect();
    assert_eq!(deleted_coords(&listener.events()), expected);

    for x in 0..16 {
        for y in 0..8 {
            let inside = (9..=12).contains(&x) && (2..=5).contains(&y);
            assert_eq!(
                store.get(&africa(x, y, 3)).unwrap().is_none(),
                inside,
                "tile {},{}",
                x,
                y
            );
        }
    }
}

#[test]
fn test_zoom_without_bounds_is_whole_level() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    for z in 1..=3 {
        fill_zoom(&store, z);
    }

    let range = TileRange::new("africa", "EPSG:4326", 2, 2, "image/png").unwrap();
    store.delete_range(&range).unwrap();

    assert!(!dir.path().join("africa/EPSG_4326_02").exists());
    assert_eq!(count_files(&dir.path().join("africa/EPSG_4326_01")), 8);
    assert_eq!(count_files(&dir.path().join("africa/EPSG_4326_03")), 128);
}

#[test]
fn test_all_zooms_range() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    for z in 0..=2 {
        fill_zoom(&store, z);
    }
    let other = TileKey::new("africa", "EPSG:900913", (0, 0, 0), "image/png");
    store.put(TileBlob::new(other.clone(), &b"m"[..])).unwrap();

    let range = TileRange::all_zooms("africa", "EPSG:4326", "image/png");
    store.delete_range(&range).unwrap();

    assert_eq!(store.layer_cache_size("africa").unwrap().tiles, 1);
    assert!(store.get(&other).unwrap().is_some());
}

#[test]
fn test_parameters_id_narrows_range() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    let id = "d".repeat(64);
    store.put(TileBlob::new(africa(1, 1, 1), &b"plain"[..])).unwrap();
    store
        .put(TileBlob::new(africa(1, 1, 1).with_parameters_id(id.as_str()), &b"styled"[..]))
        .unwrap();
    let listener = RecordingListener::attach(&store);

    let range = TileRange::new("africa", "EPSG:4326", 0, 5, "image/png")
        .unwrap()
        .with_parameters_id(id.as_str());
    store.delete_range(&range).unwrap();

    assert!(store.get(&africa(1, 1, 1)).unwrap().is_some());
    assert!(store
        .get(&africa(1, 1, 1).with_parameters_id(id.as_str()))
        .unwrap()
        .is_none());

    let events = listener.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Deleted { key, .. } => assert_eq!(key.parameters_id(), Some(id.as_str())),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_format_narrows_range() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    let jpeg = TileKey::new("africa", "EPSG:4326", (0, 0, 0), "image/jpeg");
    store.put(TileBlob::new(africa(0, 0, 0), &b"png"[..])).unwrap();
    store.put(TileBlob::new(jpeg.clone(), &b"jpeg"[..])).unwrap();

    let range = TileRange::new("africa", "EPSG:4326", 0, 0, "image/jpeg").unwrap();
    store.delete_range(&range).unwrap();

    assert!(store.get(&jpeg).unwrap().is_none());
    assert!(store.get(&africa(0, 0, 0)).unwrap().is_some());
}

#[test]
fn test_missing_layer_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    let range = TileRange::new("nowhere", "EPSG:4326", 0, 3, "image/png").unwrap();
    assert!(store.delete_range(&range).unwrap());
}

#[test]
fn test_foreign_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_sharded(dir.path());
    store.put(TileBlob::new(africa(0, 0, 0), &b"t"[..])).unwrap();

    let shard = dir.path().join("africa/EPSG_4326_00/0_0");
    fs::write(shard.join("readme.txt"), b"keep").unwrap();
    fs::write(shard.join("zz_00.png"), b"keep").unwrap();
    fs::create_dir_all(dir.path().join("africa/EPSG_4326_xx/0_0")).unwrap();
    fs::write(dir.path().join("africa/EPSG_4326_xx/0_0/00_00.png"), b"keep").unwrap();

    let range = TileRange::all_zooms("africa", "EPSG:4326", "image/png");
    store.delete_range(&range).unwrap();

    assert!(store.get(&africa(0, 0, 0)).unwrap().is_none());
    assert!(shard.join("readme.txt").is_file());
    assert!(shard.join("zz_00.png").is_file());
    assert!(dir.path().join("africa/EPSG_4326_xx/0_0/00_00.png").is_file());
}

#[test]
fn test_xyz_range_uses_tms_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_xyz(dir.path(), Convention::Xyz);
    fill_zoom(&store, 1);
    let listener = RecordingListener::attach(&store);

    // bottom row in TMS numbering
    let range = TileRange::new("africa", "EPSG:4326", 1, 1, "image/png")
        .unwrap()
        .with_bounds(1, RangeBounds::new(0, 0, 3, 0));
    store.delete_range(&range).unwrap();

    let expected: BTreeSet<_> = (0..4).map(|x| (x, 0, 1)).collect();
    assert_eq!(deleted_coords(&listener.events()), expected);
    for x in 0..4 {
        assert!(store.get(&africa(x, 0, 1)).unwrap().is_none());
        assert!(store.get(&africa(x, 1, 1)).unwrap().is_some());
    }
    // row 0 is stored as the top row (1) of the xyz tree
    assert!(!dir.path().join("africa/EPSG_4326/1/0/1.png").exists());
    assert!(dir.path().join("africa/EPSG_4326/1/0/0.png").is_file());
}

#[test]
fn test_tms_range_deletes_and_prunes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_xyz(dir.path(), Convention::Tms);
    fill_zoom(&store, 2);

    let range = TileRange::new("africa", "EPSG:4326", 2, 2, "image/png")
        .unwrap()
        .with_bounds(2, RangeBounds::new(2, 0, 3, 3));
    store.delete_range(&range).unwrap();

    assert!(!dir.path().join("africa/EPSG_4326/2/2").exists());
    assert!(!dir.path().join("africa/EPSG_4326/2/3").exists());
    assert_eq!(count_files(&dir.path().join("africa/EPSG_4326/2")), 32 - 8);
}

/// Small deterministic generator so randomized cases replay identically.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Uniform value in `[low, high]`.
    fn between(&mut self, low: i64, high: i64) -> i64 {
        low + (self.next() % (high - low + 1) as u64) as i64
    }
}

fn random_range(rng: &mut XorShift, max_zoom: i32) -> TileRange {
    if rng.next() % 8 == 0 {
        return TileRange::all_zooms("africa", "EPSG:4326", "image/png");
    }
    let start = rng.between(0, i64::from(max_zoom)) as i32;
    let stop = rng.between(i64::from(start), i64::from(max_zoom)) as i32;
    let mut range = TileRange::new("africa", "EPSG:4326", start, stop, "image/png").unwrap();
    for z in start..=stop {
        // leave some levels unbounded, and let rectangles spill past the grid
        if rng.next() % 3 == 0 {
            continue;
        }
        let (wide, high) = (2_i64 << z, 1_i64 << z);
        let (x0, x1) = (rng.between(-2, wide + 1), rng.between(-2, wide + 1));
        let (y0, y1) = (rng.between(-2, high + 1), rng.between(-2, high + 1));
        let bounds = RangeBounds::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1));
        range = range.with_bounds(z, bounds);
    }
    range
}

#[test]
fn test_random_ranges_delete_exactly_contained_tiles() {
    let max_zoom = 6;
    for seed in 1..=10_u64 {
        for convention in [None, Some(Convention::Xyz), Some(Convention::Tms)] {
            let mut rng = XorShift(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let dir = tempfile::tempdir().unwrap();
            let store = match convention {
                None => open_sharded(dir.path()),
                Some(convention) => open_xyz(dir.path(), convention),
            };

            let mut stored = BTreeSet::new();
            for _ in 0..120 {
                let z = rng.between(0, i64::from(max_zoom)) as i32;
                let x = rng.between(0, (2_i64 << z) - 1);
                let y = rng.between(0, (1_i64 << z) - 1);
                store.put(TileBlob::new(africa(x, y, z), &b"t"[..])).unwrap();
                stored.insert((x, y, z));
            }

            let range = random_range(&mut rng, max_zoom);
            let listener = RecordingListener::attach(&store);
            store.delete_range(&range).unwrap();

            let expected: BTreeSet<_> = stored
                .iter()
                .copied()
                .filter(|&(x, y, z)| range.contains(x, y, z))
                .collect();
            assert_eq!(
                deleted_coords(&listener.events()),
                expected,
                "seed {} {:?} {:?}",
                seed,
                convention,
                range
            );
            for &(x, y, z) in &stored {
                assert_eq!(
                    store.get(&africa(x, y, z)).unwrap().is_some(),
                    !expected.contains(&(x, y, z)),
                    "seed {} {:?} tile {},{},{}",
                    seed,
                    convention,
                    x,
                    y,
                    z
                );
            }
            store.close();
        }
    }
}
