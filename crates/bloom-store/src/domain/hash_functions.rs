//! Hash functions for Bloom filter
//!
//! Two keyed SipHash-2-4 instances give the base hashes `h1` and `h2`; the
//! i-th bit position is `(h1 + i * h2) mod m` (Kirsch–Mitzenmacher double
//! hashing). The keys below are part of the persisted format: changing them
//! makes every existing image answer `contains` incorrectly.

use std::hash::Hasher;

use siphasher::sip::SipHasher24;

/// SipHash keys for `h1`
pub const H1_KEYS: (u64, u64) = (0x51af_3d9c_7b2e_4a61, 0x0d3c_6f8e_92a4_b715);
/// SipHash keys for `h2`
pub const H2_KEYS: (u64, u64) = (0x9e37_79b9_7f4a_7c15, 0xc2b2_ae3d_27d4_eb4f);

/// Keyed hash family mapping a byte key to `k` bit positions
#[derive(Clone, Debug)]
pub struct HashFamily {
    hashers: [SipHasher24; 2],
}

impl Default for HashFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl HashFamily {
    pub fn new() -> Self {
        Self {
            hashers: [
                SipHasher24::new_with_keys(H1_KEYS.0, H1_KEYS.1),
                SipHasher24::new_with_keys(H2_KEYS.0, H2_KEYS.1),
            ],
        }
    }

    /// The two base hashes `(h1, h2)` of `key`
    ///
    /// The key is written as raw bytes, without the length prefix or
    /// terminator `Hash` impls would add.
    pub fn base_hashes(&self, key: &[u8]) -> (u64, u64) {
        let h1 = {
            let mut hasher = self.hashers[0].clone();
            hasher.write(key);
            hasher.finish()
        };
        let h2 = {
            let mut hasher = self.hashers[1].clone();
            hasher.write(key);
            hasher.finish()
        };
        (h1, h2)
    }

    /// Exactly `hash_count` positions in `[0, bit_count)` for `key`
    ///
    /// A zero `bit_count` has no positions, so the iterator is empty.
    pub fn indices(&self, key: &[u8], hash_count: u32, bit_count: u64) -> HashIndices {
        let (h1, h2) = self.base_hashes(key);
        HashIndices {
            h1,
            h2,
            next: 0,
            hash_count: if bit_count == 0 { 0 } else { hash_count },
            bit_count,
        }
    }
}

/// Iterator over the double-hashed positions of one key
#[derive(Clone, Debug)]
pub struct HashIndices {
    h1: u64,
    h2: u64,
    next: u32,
    hash_count: u32,
    bit_count: u64,
}

impl Iterator for HashIndices {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.hash_count {
            return None;
        }
        let hash = self
            .h1
            .wrapping_add(u64::from(self.next).wrapping_mul(self.h2));
        self.next += 1;
        Some(hash % self.bit_count)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.hash_count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HashIndices {}

/// Compute k hash positions for an element with the default family
pub fn compute_hash_positions(element: &[u8], k: u32, m: u64) -> Vec<u64> {
    HashFamily::new().indices(element, k, m).collect()
}
