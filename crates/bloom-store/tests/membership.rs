//! # Membership Tests
//!
//! Zero false negatives, the planned false positive rate, and the pinned
//! alice/bob/charlie scenario at `plan(100_000_000, 0.001)`.

use bloom_store::{BloomFilter, FilterParameters, HashFamily};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// REFERENCE SCENARIO
// =============================================================================

#[test]
fn test_reference_plan() {
    let params = FilterParameters::plan(100_000_000, 0.001).unwrap();
    assert_eq!(params.bit_count, 1_437_758_757);
    assert_eq!(params.hash_count, 10);
    assert!(params.estimated_fpr(100_000_000) <= 0.001 * 1.01);
}

#[test]
fn test_reference_indices_are_pinned() {
    let family = HashFamily::new();
    let alice: Vec<u64> = family.indices(b"alice", 10, 1_437_758_757).collect();
    assert_eq!(
        alice,
        vec![
            374_963_433,
            989_222_595,
            805_401_953,
            1_419_661_115,
            596_161_520,
            1_210_420_682,
            1_026_600_040,
            203_100_445,
            817_359_607,
            633_538_965,
        ]
    );
}

#[test]
fn test_alice_bob_charlie_in_memory() {
    let filter = BloomFilter::new(100_000_000, 0.001).unwrap();
    filter.add("alice").unwrap();
    filter.add("bob").unwrap();

    assert!(filter.contains("alice").unwrap());
    assert!(filter.contains("bob").unwrap());
    assert!(
        !filter.contains("charlie").unwrap(),
        "charlie's indices are not covered by alice and bob"
    );
    assert_eq!(filter.bits_set().unwrap(), 20);
}

#[test]
fn test_alice_bob_charlie_direct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.bloom");
    {
        let filter = BloomFilter::open_direct(100_000_000, 0.001, &path).unwrap();
        filter.add("alice").unwrap();
        filter.add("bob").unwrap();
    }

    let filter = BloomFilter::open_direct(100_000_000, 0.001, &path).unwrap();
    assert!(filter.contains("alice").unwrap());
    assert!(filter.contains("bob").unwrap());
    assert!(!filter.contains("charlie").unwrap());
    assert_eq!(filter.items_added(), 2);
}

// =============================================================================
// FALSE POSITIVE RATE
// =============================================================================

#[test]
fn test_observed_fpr_near_target() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let filter = BloomFilter::new(10_000, 0.01).unwrap();

    for _ in 0..10_000 {
        let key: [u8; 16] = rng.gen();
        filter.add(key).unwrap();
    }

    let lookups = 100_000;
    let mut false_positives = 0;
    for _ in 0..lookups {
        // Members are 16 bytes, lookups 17, so no lookup key was ever added
        let key: [u8; 17] = rng.gen();
        if filter.contains(key).unwrap() {
            false_positives += 1;
        }
    }

    let observed = false_positives as f64 / lookups as f64;
    assert!(observed < 0.015, "observed fpr {} too far above 0.01", observed);
}

#[test]
fn test_overfilled_filter_degrades_but_keeps_members() {
    let filter = BloomFilter::new(100, 0.01).unwrap();
    let keys: Vec<String> = (0..1_000).map(|i| format!("key-{}", i)).collect();
    for key in &keys {
        filter.add(key).unwrap();
    }

    assert!(filter.estimated_false_positive_rate() > 0.5);
    for key in &keys {
        assert!(filter.contains(key).unwrap(), "no false negatives past capacity");
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_no_false_negatives(
        keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..200),
    ) {
        let filter = BloomFilter::new(keys.len() as u64, 0.01).unwrap();
        for key in &keys {
            filter.add(key).unwrap();
        }
        for key in &keys {
            prop_assert!(filter.contains(key).unwrap());
        }
        prop_assert_eq!(filter.items_added(), keys.len() as u64);
    }

    #[test]
    fn prop_repeated_add_leaves_bits_unchanged(
        key in prop::collection::vec(any::<u8>(), 0..32),
        repeats in 1usize..5,
    ) {
        let once = BloomFilter::new(50, 0.01).unwrap();
        once.add(&key).unwrap();

        let many = BloomFilter::new(50, 0.01).unwrap();
        for _ in 0..repeats {
            many.add(&key).unwrap();
        }

        prop_assert_eq!(once.bits_set().unwrap(), many.bits_set().unwrap());
        prop_assert_eq!(many.items_added(), repeats as u64);
    }
}
