//! # Persistence Tests
//!
//! Round trips through the on-disk image and rejection of every kind of
//! damaged image, through the public engine API.

use std::fs;
use std::path::Path;

use bloom_store::adapters::storage::file;
use bloom_store::domain::HEADER_LEN;
use bloom_store::{BloomConfig, BloomFilter, FilterError, StorageMode};
use proptest::prelude::*;

// =============================================================================
// TEST HELPERS
// =============================================================================

/// Unlocked, no drop flush, so tests control exactly when images are written
fn config(path: &Path, mode: StorageMode) -> BloomConfig {
    BloomConfig {
        lock_storage: false,
        flush_on_drop: false,
        ..BloomConfig::new(100, 0.01)
            .unwrap()
            .with_storage_path(path)
            .with_storage_mode(mode)
    }
}

fn write_image(path: &Path, keys: &[&str]) {
    let filter = BloomFilter::open(100, 0.01, path).unwrap();
    for key in keys {
        filter.add(key).unwrap();
    }
    filter.close().unwrap();
}

fn assert_corrupt(path: &Path) {
    for mode in [StorageMode::Memory, StorageMode::Direct] {
        match BloomFilter::from_config(&config(path, mode)) {
            Err(FilterError::CorruptFile { .. }) => {}
            other => panic!("{:?}: expected CorruptFile, got {:?}", mode, other),
        }
    }
}

// =============================================================================
// ROUND TRIPS
// =============================================================================

#[test]
fn test_round_trip_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.bloom");
    let second = dir.path().join("second.bloom");
    write_image(&first, &["alice", "bob", "carol"]);

    let reloaded = BloomFilter::from_config(&config(&first, StorageMode::Memory)).unwrap();
    reloaded.save(&second).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_round_trip_preserves_answers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    let before = BloomFilter::new(100, 0.01).unwrap();
    for i in 0..80 {
        before.add(format!("member-{}", i)).unwrap();
    }
    before.save(&path).unwrap();

    let after = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    for i in 0..500 {
        let key = format!("stranger-{}", i);
        assert_eq!(before.contains(&key).unwrap(), after.contains(&key).unwrap());
    }
    for i in 0..80 {
        assert!(after.contains(format!("member-{}", i)).unwrap());
    }
    assert_eq!(after.items_added(), 80);
}

#[test]
fn test_direct_image_is_readable_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.bloom");
    let direct = BloomFilter::from_config(&config(&path, StorageMode::Direct)).unwrap();
    direct.add("alice").unwrap();
    direct.flush().unwrap();
    drop(direct);

    let memory = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    assert!(memory.contains("alice").unwrap());
    assert_eq!(memory.storage_mode(), StorageMode::Memory);
}

#[test]
fn test_direct_save_to_other_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.bloom");
    let copy = dir.path().join("copy.bloom");
    let direct = BloomFilter::from_config(&config(&path, StorageMode::Direct)).unwrap();
    direct.add("alice").unwrap();
    direct.save(&copy).unwrap();

    assert!(direct.is_dirty(), "own image header still stale");
    let image = file::load(&copy).unwrap();
    assert_eq!(image.header.items_added, 1);
}

#[test]
fn test_empty_filter_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bloom");
    write_image(&path, &[]);

    assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_LEN as u64 + 120);
    let reloaded = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    assert_eq!(reloaded.bits_set().unwrap(), 0);
    assert_eq!(reloaded.items_added(), 0);
}

#[test]
fn test_stray_temp_file_does_not_affect_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);
    fs::write(dir.path().join("filter.bloom.tmp"), b"BLMF partial").unwrap();

    let filter = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    assert!(filter.contains("alice").unwrap());
}

#[test]
fn test_items_beyond_capacity_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("full.bloom");
    let keys: Vec<String> = (0..150).map(|i| i.to_string()).collect();
    let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    write_image(&path, &refs);

    let filter = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    assert_eq!(filter.items_added(), 150);
    assert!(filter.estimated_false_positive_rate() > 0.01);
}

// =============================================================================
// CORRUPT IMAGES
// =============================================================================

#[test]
fn test_rejects_bad_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[0..4].copy_from_slice(b"NOPE");
    fs::write(&path, &bytes).unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_rejects_truncated_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_rejects_truncated_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..20]).unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_rejects_mismatched_bit_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[8..16].copy_from_slice(&2_000u64.to_le_bytes());
    fs::write(&path, &bytes).unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_rejects_payload_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[HEADER_LEN + 60] ^= 0x10;
    fs::write(&path, &bytes).unwrap();
    assert_corrupt(&path);
}

#[test]
fn test_rejects_set_padding_bits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    // m = 959: the top bit of the last payload byte is padding
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] |= 0x80;
    let crc = crc32fast::hash(&bytes[HEADER_LEN..]);
    bytes[20..24].copy_from_slice(&crc.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        BloomFilter::open(100, 0.01, &path),
        Err(FilterError::CorruptFile { .. })
    ));
    assert!(matches!(
        BloomFilter::open_direct(100, 0.01, &path),
        Err(FilterError::CorruptFile { .. })
    ));
}

#[test]
fn test_rejects_unknown_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);

    let mut bytes = fs::read(&path).unwrap();
    bytes[4..6].copy_from_slice(&7u16.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        BloomFilter::from_config(&config(&path, StorageMode::Memory)),
        Err(FilterError::VersionMismatch {
            found: 7,
            supported: 1
        })
    ));
}

#[test]
fn test_direct_crash_before_flush_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("direct.bloom");
    let filter = BloomFilter::from_config(&config(&path, StorageMode::Direct)).unwrap();
    filter.add("alice").unwrap();
    // flush_on_drop is off: header checksum is never refreshed
    drop(filter);

    assert_corrupt(&path);
}

#[test]
fn test_failed_store_keeps_previous_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.bloom");
    write_image(&path, &["alice"]);
    let before = fs::read(&path).unwrap();

    // A directory squatting on the temp path makes the next store fail
    fs::create_dir(dir.path().join("filter.bloom.tmp")).unwrap();
    let filter = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
    filter.add("bob").unwrap();
    assert!(matches!(filter.flush(), Err(FilterError::Io { .. })));

    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(filter.is_dirty());
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_save_load_keeps_members(
        keys in prop::collection::vec("[a-z0-9]{0,24}", 1..100),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.bloom");

        let filter = BloomFilter::new(100, 0.01).unwrap();
        for key in &keys {
            filter.add(key).unwrap();
        }
        filter.save(&path).unwrap();

        let reloaded = BloomFilter::from_config(&config(&path, StorageMode::Memory)).unwrap();
        for key in &keys {
            prop_assert!(reloaded.contains(key).unwrap());
        }
        prop_assert_eq!(reloaded.bits_set().unwrap(), filter.bits_set().unwrap());
    }
}
