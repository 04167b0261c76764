//! Whole-image persistence.
//!
//! `store` writes `<path>.tmp`, syncs it and renames it over `<path>`, so a
//! crash leaves either the previous image or the new one at `path`, never a
//! mix. A stray temp file is never read and is overwritten by the next store.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::domain::bit_array::{padding_is_clear, BitArray};
use crate::domain::image::{ImageHeader, HEADER_LEN};
use crate::domain::parameters::FilterParameters;
use crate::error::{FilterError, FilterResult};
use crate::ports::outbound::BitStore;

/// A fully loaded image: header plus in-memory bits
#[derive(Clone, Debug)]
pub struct PersistedImage {
    pub header: ImageHeader,
    pub bits: BitArray,
}

/// Load and validate the image at `path`
///
/// # Errors
/// `Io` if the file cannot be read, `VersionMismatch` for an unknown format
/// version, `CorruptFile` for anything else that does not check out.
pub fn load(path: &Path) -> FilterResult<PersistedImage> {
    let start = Instant::now();
    let mut file = File::open(path).map_err(|e| FilterError::io(path, e))?;
    let file_len = file
        .metadata()
        .map_err(|e| FilterError::io(path, e))?
        .len();

    let header = read_header(path, &mut file, file_len)?;
    check_image_len(path, &header, file_len)?;

    let mut payload = vec![0u8; header.parameters.payload_len()];
    file.read_exact(&mut payload)
        .map_err(|e| FilterError::io(path, e))?;

    let crc = crc32fast::hash(&payload);
    if crc != header.payload_crc {
        return Err(FilterError::corrupt(
            path,
            format!(
                "payload checksum mismatch: header {:#010x}, computed {:#010x}",
                header.payload_crc, crc
            ),
        ));
    }
    if !padding_is_clear(header.parameters.bit_count, &payload) {
        return Err(FilterError::corrupt(path, "padding bits past bit_count are set"));
    }

    let bits = BitArray::from_payload(header.parameters.bit_count, payload)
        .map_err(|e| FilterError::corrupt(path, e.to_string()))?;

    info!(
        path = %path.display(),
        bit_count = header.parameters.bit_count,
        hash_count = header.parameters.hash_count,
        items_added = header.items_added,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Loaded filter image"
    );

    Ok(PersistedImage { header, bits })
}

/// Atomically write an image of `bits` to `path`
///
/// Returns the header that was written.
pub fn store<S: BitStore>(
    path: &Path,
    parameters: &FilterParameters,
    items_added: u64,
    bits: &S,
) -> FilterResult<ImageHeader> {
    if bits.bit_count() != parameters.bit_count {
        return Err(FilterError::InvalidParameters(format!(
            "bit store holds {} bits, parameters say {}",
            bits.bit_count(),
            parameters.bit_count
        )));
    }

    let start = Instant::now();
    ensure_parent(path)?;

    let temp_path = temp_path(path);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| FilterError::io(&temp_path, e))?;

    // Header goes last, once the checksum is known
    let mut writer = BufWriter::with_capacity(1 << 20, file);
    writer
        .write_all(&[0u8; HEADER_LEN])
        .map_err(|e| FilterError::io(&temp_path, e))?;

    let mut hasher = crc32fast::Hasher::new();
    bits.visit_payload(&mut |chunk| {
        hasher.update(chunk);
        writer
            .write_all(chunk)
            .map_err(|e| FilterError::io(&temp_path, e))
    })?;

    let header = ImageHeader {
        parameters: *parameters,
        items_added,
        payload_crc: hasher.finalize(),
    };

    let mut file = writer
        .into_inner()
        .map_err(|e| FilterError::io(&temp_path, e.into_error()))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| FilterError::io(&temp_path, e))?;
    file.write_all(&header.encode())
        .map_err(|e| FilterError::io(&temp_path, e))?;
    file.sync_all()
        .map_err(|e| FilterError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| FilterError::io(path, e))?;
    sync_parent(path);

    info!(
        path = %path.display(),
        bytes = header.image_len(),
        items_added,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Stored filter image"
    );

    Ok(header)
}

/// Read and decode the header at the start of `file`
pub(crate) fn read_header(
    path: &Path,
    file: &mut File,
    file_len: u64,
) -> FilterResult<ImageHeader> {
    if file_len < HEADER_LEN as u64 {
        return Err(FilterError::corrupt(
            path,
            format!("file is {} bytes, shorter than the header", file_len),
        ));
    }
    let mut raw = [0u8; HEADER_LEN];
    file.read_exact(&mut raw)
        .map_err(|e| FilterError::io(path, e))?;
    ImageHeader::decode(path, &raw)
}

/// The file must hold exactly the header plus `ceil(m / 8)` payload bytes
pub(crate) fn check_image_len(path: &Path, header: &ImageHeader, file_len: u64) -> FilterResult<()> {
    let expected = header.image_len();
    if file_len != expected {
        let what = if file_len < expected {
            "truncated"
        } else {
            "has trailing bytes"
        };
        return Err(FilterError::corrupt(
            path,
            format!(
                "payload {}: file is {} bytes, bit_count {} needs {}",
                what, file_len, header.parameters.bit_count, expected
            ),
        ));
    }
    Ok(())
}

/// `<path>.tmp`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn ensure_parent(path: &Path) -> FilterResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| FilterError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Best-effort fsync of the directory entry after a rename
pub(crate) fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            debug!(path = %parent.display(), error = %e, "Directory fsync failed");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
