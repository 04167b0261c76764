//! Bit storage backends and image persistence

pub mod direct;
pub mod file;

pub use direct::FileBitArray;
pub use file::{load, store, PersistedImage};

use crate::domain::bit_array::BitArray;
use crate::error::FilterResult;
use crate::ports::outbound::{BitStore, PayloadVisitor};

/// The bit store an engine was opened with
#[derive(Debug)]
pub enum BitStorage {
    Memory(BitArray),
    Direct(FileBitArray),
}

impl BitStorage {
    pub fn is_direct(&self) -> bool {
        matches!(self, BitStorage::Direct(_))
    }

    /// Copy of the packed payload
    pub fn to_payload(&self) -> FilterResult<Vec<u8>> {
        match self {
            BitStorage::Memory(bits) => Ok(bits.as_bytes().to_vec()),
            BitStorage::Direct(bits) => {
                let mut payload = Vec::with_capacity(bits.bit_count().div_ceil(8) as usize);
                bits.visit_payload(&mut |chunk| {
                    payload.extend_from_slice(chunk);
                    Ok(())
                })?;
                Ok(payload)
            }
        }
    }
}

impl BitStore for BitStorage {
    fn bit_count(&self) -> u64 {
        match self {
            BitStorage::Memory(bits) => bits.bit_count(),
            BitStorage::Direct(bits) => bits.bit_count(),
        }
    }

    fn set(&mut self, index: u64) -> FilterResult<()> {
        match self {
            BitStorage::Memory(bits) => bits.set(index),
            BitStorage::Direct(bits) => bits.set(index),
        }
    }

    fn test(&self, index: u64) -> FilterResult<bool> {
        match self {
            BitStorage::Memory(bits) => bits.test(index),
            BitStorage::Direct(bits) => bits.test(index),
        }
    }

    fn visit_payload(&self, visitor: &mut PayloadVisitor<'_>) -> FilterResult<()> {
        match self {
            BitStorage::Memory(bits) => bits.visit_payload(visitor),
            BitStorage::Direct(bits) => bits.visit_payload(visitor),
        }
    }

    fn or_payload(&mut self, payload: &[u8]) -> FilterResult<()> {
        match self {
            BitStorage::Memory(bits) => bits.or_payload(payload),
            BitStorage::Direct(bits) => bits.or_payload(payload),
        }
    }

    fn count_ones(&self) -> FilterResult<u64> {
        match self {
            BitStorage::Memory(bits) => bits.count_ones(),
            BitStorage::Direct(bits) => bits.count_ones(),
        }
    }
}
