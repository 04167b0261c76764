//! Error types for the Bloom store

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors that can occur while planning, using or persisting a filter
///
/// A false positive from `contains` is never an error.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid filter parameters: {0}")]
    InvalidParameters(String),

    #[error("Bit index out of bounds: {index} >= {bit_count}")]
    IndexOutOfBounds { index: u64, bit_count: u64 },

    #[error("Corrupt filter image {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    #[error("Unsupported filter image version {found} (supported: {supported})")]
    VersionMismatch { found: u16, supported: u16 },

    #[error(
        "Persisted filter parameters differ: expected m={}, k={}, found m={}, k={}",
        expected.0, expected.1, found.0, found.1
    )]
    ParameterMismatch {
        /// `(bit_count, hash_count)` the caller asked for
        expected: (u64, u32),
        /// `(bit_count, hash_count)` actually found
        found: (u64, u32),
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}", locked_message(path, *pid))]
    Locked { path: PathBuf, pid: Option<u32> },
}

impl FilterError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FilterError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a `CorruptFile` error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FilterError::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn locked_message(path: &std::path::Path, pid: Option<u32>) -> String {
    match pid {
        Some(p) => format!(
            "Filter storage already in use by process {} ({})",
            p,
            path.display()
        ),
        None => format!("Filter storage already in use ({})", path.display()),
    }
}
