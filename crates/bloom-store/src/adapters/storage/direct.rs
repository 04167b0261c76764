//! File-resident bit array.
//!
//! Bits are read and written in place inside the persisted image: bit `i` is
//! the byte at `HEADER_LEN + i / 8`. Only that one byte is touched per access,
//! so a filter far larger than RAM stays usable. The header's `items_added`
//! and checksum are only refreshed by `write_header`; until then a reopen sees
//! a checksum mismatch and reports `CorruptFile`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::adapters::storage::file::{
    check_image_len, ensure_parent, read_header, sync_parent, temp_path,
};
use crate::domain::bit_array::padding_is_clear;
use crate::domain::image::{ImageHeader, HEADER_LEN};
use crate::domain::parameters::FilterParameters;
use crate::error::{FilterError, FilterResult};
use crate::ports::outbound::{BitStore, PayloadVisitor};

const CHUNK_LEN: usize = 1 << 16;

/// Bit array stored directly in an image file
#[derive(Debug)]
pub struct FileBitArray {
    file: File,
    path: PathBuf,
    bit_count: u64,
}

impl FileBitArray {
    /// Create a zeroed image at `path`
    ///
    /// The image is assembled under `<path>.tmp` and renamed into place, so
    /// `path` never holds a partial header.
    pub fn create(path: &Path, parameters: &FilterParameters) -> FilterResult<(Self, ImageHeader)> {
        ensure_parent(path)?;
        let payload_len = parameters.payload_len();

        let mut hasher = crc32fast::Hasher::new();
        let zeros = vec![0u8; CHUNK_LEN.min(payload_len)];
        let mut remaining = payload_len;
        while remaining > 0 {
            let n = remaining.min(zeros.len());
            hasher.update(&zeros[..n]);
            remaining -= n;
        }
        let header = ImageHeader {
            parameters: *parameters,
            items_added: 0,
            payload_crc: hasher.finalize(),
        };

        let temp_path = temp_path(path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| FilterError::io(&temp_path, e))?;
            file.write_all(&header.encode())
                .map_err(|e| FilterError::io(&temp_path, e))?;
            // Extending the file zero-fills the payload
            file.set_len(header.image_len())
                .map_err(|e| FilterError::io(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| FilterError::io(&temp_path, e))?;
        }
        fs::rename(&temp_path, path).map_err(|e| FilterError::io(path, e))?;
        sync_parent(path);

        info!(
            path = %path.display(),
            bit_count = parameters.bit_count,
            bytes = header.image_len(),
            "Created file-resident filter image"
        );

        let file = open_rw(path)?;
        Ok((
            Self {
                file,
                path: canonical(path),
                bit_count: parameters.bit_count,
            },
            header,
        ))
    }

    /// Open and fully validate an existing image
    pub fn open(path: &Path) -> FilterResult<(Self, ImageHeader)> {
        let mut file = open_rw(path)?;
        let file_len = file
            .metadata()
            .map_err(|e| FilterError::io(path, e))?
            .len();
        let header = read_header(path, &mut file, file_len)?;
        check_image_len(path, &header, file_len)?;

        // Sequential pass: checksum and trailing padding
        let mut hasher = crc32fast::Hasher::new();
        let mut reader = io::BufReader::with_capacity(CHUNK_LEN, &mut file);
        let mut remaining = header.parameters.payload_len();
        let mut buf = vec![0u8; CHUNK_LEN.min(remaining.max(1))];
        let mut last = 0u8;
        while remaining > 0 {
            let n = remaining.min(buf.len());
            reader
                .read_exact(&mut buf[..n])
                .map_err(|e| FilterError::io(path, e))?;
            hasher.update(&buf[..n]);
            last = buf[n - 1];
            remaining -= n;
        }
        drop(reader);

        let crc = hasher.finalize();
        if crc != header.payload_crc {
            return Err(FilterError::corrupt(
                path,
                format!(
                    "payload checksum mismatch: header {:#010x}, computed {:#010x}",
                    header.payload_crc, crc
                ),
            ));
        }
        if !padding_is_clear(header.parameters.bit_count, &[last]) {
            return Err(FilterError::corrupt(path, "padding bits past bit_count are set"));
        }

        info!(
            path = %path.display(),
            bit_count = header.parameters.bit_count,
            items_added = header.items_added,
            "Opened file-resident filter image"
        );

        Ok((
            Self {
                file,
                path: canonical(path),
                bit_count: header.parameters.bit_count,
            },
            header,
        ))
    }

    /// Canonical path of the backing image
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `path` names this store's backing image
    pub fn is_backed_by(&self, path: &Path) -> bool {
        canonical(path) == self.path
    }

    /// Recompute the checksum and rewrite the header in place, then fsync
    pub fn write_header(
        &self,
        parameters: &FilterParameters,
        items_added: u64,
    ) -> FilterResult<ImageHeader> {
        let mut hasher = crc32fast::Hasher::new();
        self.visit_payload(&mut |chunk| {
            hasher.update(chunk);
            Ok(())
        })?;
        let header = ImageHeader {
            parameters: *parameters,
            items_added,
            payload_crc: hasher.finalize(),
        };
        write_all_at(&self.file, &header.encode(), 0)
            .map_err(|e| FilterError::io(&self.path, e))?;
        self.file
            .sync_all()
            .map_err(|e| FilterError::io(&self.path, e))?;
        Ok(header)
    }

    /// Stream a copy of this image to an atomic image at `path`
    pub fn copy_to(
        &self,
        path: &Path,
        parameters: &FilterParameters,
        items_added: u64,
    ) -> FilterResult<ImageHeader> {
        crate::adapters::storage::file::store(path, parameters, items_added, self)
    }

    fn byte_offset(index: u64) -> u64 {
        HEADER_LEN as u64 + index / 8
    }

    fn read_byte(&self, index: u64) -> FilterResult<u8> {
        let mut byte = [0u8; 1];
        read_exact_at(&self.file, &mut byte, Self::byte_offset(index))
            .map_err(|e| FilterError::io(&self.path, e))?;
        Ok(byte[0])
    }
}

impl BitStore for FileBitArray {
    fn bit_count(&self) -> u64 {
        self.bit_count
    }

    fn set(&mut self, index: u64) -> FilterResult<()> {
        self.check_index(index)?;
        let mask = 1u8 << (index % 8);
        let byte = self.read_byte(index)?;
        if byte & mask == 0 {
            write_all_at(&self.file, &[byte | mask], Self::byte_offset(index))
                .map_err(|e| FilterError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn test(&self, index: u64) -> FilterResult<bool> {
        self.check_index(index)?;
        Ok(self.read_byte(index)? & (1u8 << (index % 8)) != 0)
    }

    fn visit_payload(&self, visitor: &mut PayloadVisitor<'_>) -> FilterResult<()> {
        let total = self.bit_count.div_ceil(8);
        let mut buf = vec![0u8; CHUNK_LEN];
        let mut offset = 0u64;
        while offset < total {
            let n = (total - offset).min(CHUNK_LEN as u64) as usize;
            read_exact_at(&self.file, &mut buf[..n], HEADER_LEN as u64 + offset)
                .map_err(|e| FilterError::io(&self.path, e))?;
            visitor(&buf[..n])?;
            offset += n as u64;
        }
        Ok(())
    }

    fn or_payload(&mut self, payload: &[u8]) -> FilterResult<()> {
        self.check_payload_len(payload)?;
        if !padding_is_clear(self.bit_count, payload) {
            return Err(FilterError::InvalidParameters(
                "padding bits past bit_count are set".to_string(),
            ));
        }
        let mut buf = vec![0u8; CHUNK_LEN];
        for (i, chunk) in payload.chunks(CHUNK_LEN).enumerate() {
            let offset = HEADER_LEN as u64 + (i * CHUNK_LEN) as u64;
            let current = &mut buf[..chunk.len()];
            read_exact_at(&self.file, current, offset)
                .map_err(|e| FilterError::io(&self.path, e))?;
            for (c, o) in current.iter_mut().zip(chunk) {
                *c |= *o;
            }
            write_all_at(&self.file, current, offset)
                .map_err(|e| FilterError::io(&self.path, e))?;
        }
        Ok(())
    }
}

fn open_rw(path: &Path) -> FilterResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| FilterError::io(path, e))
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
