//! Optimal Bloom filter parameter calculation
//!
//! FPR = (1 - e^(-kn/m))^k
//!
//! Formulas:
//! - m = -n*ln(fpr) / (ln(2)^2)  -- optimal bits
//! - k = (m/n) * ln(2)           -- optimal hash functions

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use super::bit_array::payload_len;
use crate::error::{FilterError, FilterResult};

/// Sizing of a filter.
///
/// `bit_count` and `hash_count` are fixed for the lifetime of a filter: either
/// planned once at creation or read verbatim from a persisted image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    /// Expected number of elements (n)
    pub expected_items: u64,
    /// Target false positive rate (p)
    pub false_positive_rate: f64,
    /// Number of bits in the filter (m)
    pub bit_count: u64,
    /// Number of hash functions (k)
    pub hash_count: u32,
}

impl FilterParameters {
    /// Plan optimal parameters for `expected_items` at `false_positive_rate`
    pub fn plan(expected_items: u64, false_positive_rate: f64) -> FilterResult<Self> {
        let (bit_count, hash_count) = plan(expected_items, false_positive_rate)?;
        Ok(Self {
            expected_items,
            false_positive_rate,
            bit_count,
            hash_count,
        })
    }

    /// Rebuild parameters from values read off disk, re-checking every bound
    pub fn from_raw(
        expected_items: u64,
        false_positive_rate: f64,
        bit_count: u64,
        hash_count: u32,
    ) -> FilterResult<Self> {
        validate_inputs(expected_items, false_positive_rate)?;
        if hash_count == 0 {
            return Err(FilterError::InvalidParameters(
                "hash_count cannot be 0".to_string(),
            ));
        }
        payload_len(bit_count)?;
        Ok(Self {
            expected_items,
            false_positive_rate,
            bit_count,
            hash_count,
        })
    }

    /// Number of payload bytes needed for `bit_count` bits
    pub fn payload_len(&self) -> usize {
        // from_raw/plan already proved this fits in usize
        self.bit_count.div_ceil(8) as usize
    }

    /// False positive rate once `items_added` elements are in the filter
    pub fn estimated_fpr(&self, items_added: u64) -> f64 {
        calculate_fpr(self.bit_count, items_added, self.hash_count)
    }

    /// Whether two parameter sets address bits identically
    pub fn same_layout(&self, other: &FilterParameters) -> bool {
        self.bit_count == other.bit_count && self.hash_count == other.hash_count
    }
}

/// Calculate optimal `(bit_count, hash_count)` for given constraints
///
/// # Errors
/// `InvalidParameters` when `expected_items == 0`, when the rate is not
/// strictly inside (0, 1), or when the bit array cannot be addressed on this
/// platform.
pub fn plan(expected_items: u64, false_positive_rate: f64) -> FilterResult<(u64, u32)> {
    validate_inputs(expected_items, false_positive_rate)?;

    let n = expected_items as f64;
    let ln2_squared = LN_2 * LN_2;

    let m = (-(n * false_positive_rate.ln()) / ln2_squared).ceil();
    if !m.is_finite() || m >= u64::MAX as f64 {
        return Err(FilterError::InvalidParameters(format!(
            "bit array for n={} p={} does not fit in 64 bits",
            expected_items, false_positive_rate
        )));
    }
    // Tiny inputs can round down to zero bits
    let bit_count = (m as u64).max(1);
    payload_len(bit_count)?;

    let k = ((bit_count as f64 / n) * LN_2).round();
    let hash_count = if k >= u32::MAX as f64 {
        u32::MAX
    } else {
        (k as u32).max(1)
    };

    Ok((bit_count, hash_count))
}

/// Calculate the false positive rate for given parameters
///
/// Formula: FPR = (1 - e^(-kn/m))^k
pub fn calculate_fpr(m: u64, n: u64, k: u32) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powf(k as f64)
}

/// Calculate optimal k for given m and n
pub fn optimal_k(m: u64, n: u64) -> u32 {
    if n == 0 {
        return 1;
    }
    (((m as f64 / n as f64) * LN_2).round() as u32).max(1)
}

fn validate_inputs(expected_items: u64, false_positive_rate: f64) -> FilterResult<()> {
    if expected_items == 0 {
        return Err(FilterError::InvalidParameters(
            "expected_items must be at least 1".to_string(),
        ));
    }
    // NaN fails both comparisons
    if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
        return Err(FilterError::InvalidParameters(format!(
            "false_positive_rate {} must be strictly between 0 and 1",
            false_positive_rate
        )));
    }
    Ok(())
}
