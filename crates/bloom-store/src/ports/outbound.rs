//! Outbound Ports (Driven Ports)
//!
//! Where the filter's bits live. The engine only sees this trait; the
//! in-memory `BitArray` and the file-resident `FileBitArray` implement it.

use crate::error::{FilterError, FilterResult};

/// Callback receiving the packed payload in order, one chunk at a time
pub type PayloadVisitor<'a> = dyn FnMut(&[u8]) -> FilterResult<()> + 'a;

/// Fixed-length bit storage, bit `i` at byte `i / 8`, mask `1 << (i % 8)`
pub trait BitStore: Send + Sync {
    /// Number of addressable bits (m)
    fn bit_count(&self) -> u64;

    /// Set bit `index` to 1. Idempotent.
    fn set(&mut self, index: u64) -> FilterResult<()>;

    /// Whether bit `index` is 1
    fn test(&self, index: u64) -> FilterResult<bool>;

    /// Whether every bit in `indices` is 1. Stops at the first zero.
    fn all_ones<I>(&self, indices: I) -> FilterResult<bool>
    where
        I: IntoIterator<Item = u64>,
        Self: Sized,
    {
        for index in indices {
            if !self.test(index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Feed the packed payload (`ceil(m / 8)` bytes) to `visitor`
    fn visit_payload(&self, visitor: &mut PayloadVisitor<'_>) -> FilterResult<()>;

    /// OR a packed payload of the same length into this store
    fn or_payload(&mut self, payload: &[u8]) -> FilterResult<()>;

    /// Number of bits set to 1
    fn count_ones(&self) -> FilterResult<u64> {
        let mut ones = 0u64;
        self.visit_payload(&mut |chunk| {
            ones += chunk.iter().map(|b| u64::from(b.count_ones())).sum::<u64>();
            Ok(())
        })?;
        Ok(ones)
    }

    /// Check `index` against `bit_count`
    fn check_index(&self, index: u64) -> FilterResult<()> {
        let bit_count = self.bit_count();
        if index >= bit_count {
            return Err(FilterError::IndexOutOfBounds { index, bit_count });
        }
        Ok(())
    }

    /// Check a payload's length against `bit_count`
    fn check_payload_len(&self, payload: &[u8]) -> FilterResult<()> {
        let expected = self.bit_count().div_ceil(8);
        if payload.len() as u64 != expected {
            return Err(FilterError::InvalidParameters(format!(
                "payload is {} bytes, {} bits need {}",
                payload.len(),
                self.bit_count(),
                expected
            )));
        }
        Ok(())
    }
}
