//! Persisted image header
//!
//! Version 1 layout, all integers little-endian, 48 bytes:
//!
//! ```text
//! 0   magic "BLMF"
//! 4   u16 format version
//! 6   u16 reserved (0)
//! 8   u64 bit_count (m)
//! 16  u32 hash_count (k)
//! 20  u32 CRC-32 of the payload
//! 24  u64 items_added
//! 32  u64 expected_items (n)
//! 40  f64 false_positive_rate (p), IEEE-754 bits
//! 48  payload: ceil(m / 8) bytes, bit i at byte i/8, mask 1 << (i % 8)
//! ```

use std::path::Path;

use super::parameters::FilterParameters;
use crate::error::{FilterError, FilterResult};

pub const MAGIC: [u8; 4] = *b"BLMF";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 48;

/// Decoded image header
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageHeader {
    pub parameters: FilterParameters,
    pub items_added: u64,
    pub payload_crc: u32,
}

impl ImageHeader {
    /// Total file length of an image with this header
    pub fn image_len(&self) -> u64 {
        HEADER_LEN as u64 + self.parameters.payload_len() as u64
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let p = &self.parameters;
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        // 6..8 reserved, left zero
        out[8..16].copy_from_slice(&p.bit_count.to_le_bytes());
        out[16..20].copy_from_slice(&p.hash_count.to_le_bytes());
        out[20..24].copy_from_slice(&self.payload_crc.to_le_bytes());
        out[24..32].copy_from_slice(&self.items_added.to_le_bytes());
        out[32..40].copy_from_slice(&p.expected_items.to_le_bytes());
        out[40..48].copy_from_slice(&p.false_positive_rate.to_bits().to_le_bytes());
        out
    }

    /// Decode and validate a header. `path` is only used for error reports.
    pub fn decode(path: &Path, bytes: &[u8]) -> FilterResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(FilterError::corrupt(
                path,
                format!("header truncated at {} bytes", bytes.len()),
            ));
        }
        if bytes[0..4] != MAGIC {
            return Err(FilterError::corrupt(path, "bad magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(FilterError::VersionMismatch {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        if bytes[6..8] != [0, 0] {
            return Err(FilterError::corrupt(path, "reserved header bytes are set"));
        }

        let bit_count = read_u64(bytes, 8);
        let hash_count = read_u32(bytes, 16);
        let payload_crc = read_u32(bytes, 20);
        let items_added = read_u64(bytes, 24);
        let expected_items = read_u64(bytes, 32);
        let false_positive_rate = f64::from_bits(read_u64(bytes, 40));

        let parameters =
            FilterParameters::from_raw(expected_items, false_positive_rate, bit_count, hash_count)
                .map_err(|e| FilterError::corrupt(path, format!("invalid header: {}", e)))?;

        Ok(Self {
            parameters,
            items_added,
            payload_crc,
        })
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ImageHeader {
        ImageHeader {
            parameters: FilterParameters::plan(100, 0.01).unwrap(),
            items_added: 3,
            payload_crc: 0xdead_beef,
        }
    }

    #[test]
    fn test_layout_is_bit_exact() {
        let bytes = header().encode();
        assert_eq!(&bytes[0..4], b"BLMF");
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..16], &959u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &7u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(&bytes[24..32], &3u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &100u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &0.01f64.to_bits().to_le_bytes());
    }

    #[test]
    fn test_decode_accepts_encoded() {
        let decoded = ImageHeader::decode(Path::new("x"), &header().encode()).unwrap();
        assert_eq!(decoded, header());
        assert_eq!(decoded.image_len(), 48 + 120);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = header().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ImageHeader::decode(Path::new("x"), &bytes),
            Err(FilterError::CorruptFile { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut bytes = header().encode();
        bytes[4] = 2;
        assert!(matches!(
            ImageHeader::decode(Path::new("x"), &bytes),
            Err(FilterError::VersionMismatch {
                found: 2,
                supported: 1
            })
        ));
    }

    #[test]
    fn test_decode_rejects_short_header() {
        let bytes = header().encode();
        assert!(matches!(
            ImageHeader::decode(Path::new("x"), &bytes[..47]),
            Err(FilterError::CorruptFile { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_zero_bit_count() {
        let mut bytes = header().encode();
        bytes[8..16].copy_from_slice(&0u64.to_le_bytes());
        assert!(matches!(
            ImageHeader::decode(Path::new("x"), &bytes),
            Err(FilterError::CorruptFile { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_reserved_bits_and_bad_rate() {
        let mut bytes = header().encode();
        bytes[7] = 1;
        assert!(ImageHeader::decode(Path::new("x"), &bytes).is_err());

        let mut bytes = header().encode();
        bytes[40..48].copy_from_slice(&1.5f64.to_bits().to_le_bytes());
        assert!(matches!(
            ImageHeader::decode(Path::new("x"), &bytes),
            Err(FilterError::CorruptFile { .. })
        ));
    }
}
