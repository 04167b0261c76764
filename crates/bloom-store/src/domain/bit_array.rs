//! In-memory bit array
//!
//! Backed by `BitVec<u8, Lsb0>`, whose raw byte slice is exactly the
//! persisted payload layout: bit `i` is byte `i / 8`, mask `1 << (i % 8)`.

use bitvec::prelude::*;

use crate::error::{FilterError, FilterResult};
use crate::ports::outbound::{BitStore, PayloadVisitor};

/// Fixed-length, heap-allocated bit array
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitArray {
    bits: BitVec<u8, Lsb0>,
    bit_count: u64,
}

impl BitArray {
    /// Allocate `bit_count` zeroed bits
    pub fn zeroed(bit_count: u64) -> FilterResult<Self> {
        let len = payload_len(bit_count)?;
        Self::from_payload(bit_count, vec![0u8; len])
    }

    /// Adopt a packed payload of exactly `ceil(bit_count / 8)` bytes
    ///
    /// Padding bits past `bit_count` in the last byte must be zero, so that
    /// the payload stays byte-identical across a save/load cycle.
    pub fn from_payload(bit_count: u64, payload: Vec<u8>) -> FilterResult<Self> {
        let expected = payload_len(bit_count)?;
        if payload.len() != expected {
            return Err(FilterError::InvalidParameters(format!(
                "payload is {} bytes, {} bits need {}",
                payload.len(),
                bit_count,
                expected
            )));
        }
        if !padding_is_clear(bit_count, &payload) {
            return Err(FilterError::InvalidParameters(
                "padding bits past bit_count are set".to_string(),
            ));
        }
        let mut bits = BitVec::<u8, Lsb0>::from_vec(payload);
        bits.truncate(bit_count as usize);
        Ok(Self { bits, bit_count })
    }

    /// Packed payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }
}

impl BitStore for BitArray {
    fn bit_count(&self) -> u64 {
        self.bit_count
    }

    fn set(&mut self, index: u64) -> FilterResult<()> {
        self.check_index(index)?;
        self.bits.set(index as usize, true);
        Ok(())
    }

    fn test(&self, index: u64) -> FilterResult<bool> {
        self.check_index(index)?;
        Ok(self.bits[index as usize])
    }

    fn visit_payload(&self, visitor: &mut PayloadVisitor<'_>) -> FilterResult<()> {
        visitor(self.as_bytes())
    }

    fn or_payload(&mut self, payload: &[u8]) -> FilterResult<()> {
        self.check_payload_len(payload)?;
        if !padding_is_clear(self.bit_count, payload) {
            return Err(FilterError::InvalidParameters(
                "padding bits past bit_count are set".to_string(),
            ));
        }
        // OR the underlying byte slices directly
        for (s, o) in self.bits.as_raw_mut_slice().iter_mut().zip(payload) {
            *s |= *o;
        }
        Ok(())
    }

    fn count_ones(&self) -> FilterResult<u64> {
        Ok(self.bits.count_ones() as u64)
    }
}

/// Number of payload bytes for `bit_count`, checked against `usize`
pub(crate) fn payload_len(bit_count: u64) -> FilterResult<usize> {
    if bit_count == 0 {
        return Err(FilterError::InvalidParameters(
            "bit_count cannot be 0".to_string(),
        ));
    }
    usize::try_from(bit_count.div_ceil(8)).map_err(|_| {
        FilterError::InvalidParameters(format!(
            "bit_count {} is not addressable on this platform",
            bit_count
        ))
    })
}

/// Whether the bits past `bit_count` in the final payload byte are zero
pub(crate) fn padding_is_clear(bit_count: u64, payload: &[u8]) -> bool {
    let used = (bit_count % 8) as u32;
    if used == 0 {
        return true;
    }
    match payload.last() {
        Some(last) => last >> used == 0,
        None => true,
    }
}
