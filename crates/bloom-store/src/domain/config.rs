//! Bloom filter configuration and validation
//!
//! # Example
//!
//! ```
//! use bloom_store::{BloomConfigBuilder, StorageMode};
//!
//! let config = BloomConfigBuilder::new()
//!     .expected_items(100_000)
//!     .false_positive_rate(0.001)
//!     .storage_path("/var/lib/app/seen.bloom")
//!     .storage_mode(StorageMode::Direct)
//!     .build()
//!     .expect("Valid config");
//! assert_eq!(config.expected_items, 100_000);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::parameters::{plan, FilterParameters};
use crate::error::{FilterError, FilterResult};

/// Where the filter's bits live while the engine is open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Bits in RAM; the image is written on flush
    #[default]
    Memory,
    /// Bits read and written in the image file itself
    Direct,
}

/// Bloom filter configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Expected number of elements (n)
    pub expected_items: u64,
    /// Target false positive rate, strictly between 0 and 1
    pub false_positive_rate: f64,
    /// Persisted image location
    pub storage_path: Option<PathBuf>,
    /// Memory-backed or file-resident bits
    pub storage_mode: StorageMode,
    /// Flush to `storage_path` when the engine is dropped
    pub flush_on_drop: bool,
    /// Reject an existing image whose (m, k) differ from the planned ones
    pub strict_parameters: bool,
    /// Hold an exclusive advisory lock on `<storage_path>.lock`
    pub lock_storage: bool,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_items: 1_000_000,
            false_positive_rate: 0.01,
            storage_path: None,
            storage_mode: StorageMode::Memory,
            flush_on_drop: true,
            strict_parameters: false,
            lock_storage: true,
        }
    }
}

impl BloomConfig {
    /// Configuration for an in-memory filter
    pub fn new(expected_items: u64, false_positive_rate: f64) -> FilterResult<Self> {
        let config = Self {
            expected_items,
            false_positive_rate,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate capacity, rate and storage settings
    pub fn validate(&self) -> FilterResult<()> {
        plan(self.expected_items, self.false_positive_rate)?;

        if self.storage_mode == StorageMode::Direct && self.storage_path.is_none() {
            return Err(FilterError::InvalidParameters(
                "direct storage mode requires a storage_path".to_string(),
            ));
        }

        Ok(())
    }

    /// Planned parameters for this configuration
    pub fn parameters(&self) -> FilterResult<FilterParameters> {
        FilterParameters::plan(self.expected_items, self.false_positive_rate)
    }

    /// Builder-style method to set the storage path
    pub fn with_storage_path(mut self, path: impl AsRef<Path>) -> Self {
        self.storage_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builder-style method to set the storage mode
    pub fn with_storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }
}

/// Builder for BloomConfig with validation
#[derive(Default)]
pub struct BloomConfigBuilder {
    expected_items: Option<u64>,
    false_positive_rate: Option<f64>,
    storage_path: Option<PathBuf>,
    storage_mode: Option<StorageMode>,
    flush_on_drop: Option<bool>,
    strict_parameters: Option<bool>,
    lock_storage: Option<bool>,
}

impl BloomConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_items(mut self, items: u64) -> Self {
        self.expected_items = Some(items);
        self
    }

    pub fn false_positive_rate(mut self, rate: f64) -> Self {
        self.false_positive_rate = Some(rate);
        self
    }

    pub fn storage_path(mut self, path: impl AsRef<Path>) -> Self {
        self.storage_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = Some(mode);
        self
    }

    pub fn flush_on_drop(mut self, enabled: bool) -> Self {
        self.flush_on_drop = Some(enabled);
        self
    }

    pub fn strict_parameters(mut self, enabled: bool) -> Self {
        self.strict_parameters = Some(enabled);
        self
    }

    pub fn lock_storage(mut self, enabled: bool) -> Self {
        self.lock_storage = Some(enabled);
        self
    }

    /// Build the BloomConfig, validating all parameters
    pub fn build(self) -> FilterResult<BloomConfig> {
        let defaults = BloomConfig::default();

        let config = BloomConfig {
            expected_items: self.expected_items.unwrap_or(defaults.expected_items),
            false_positive_rate: self
                .false_positive_rate
                .unwrap_or(defaults.false_positive_rate),
            storage_path: self.storage_path.or(defaults.storage_path),
            storage_mode: self.storage_mode.unwrap_or(defaults.storage_mode),
            flush_on_drop: self.flush_on_drop.unwrap_or(defaults.flush_on_drop),
            strict_parameters: self
                .strict_parameters
                .unwrap_or(defaults.strict_parameters),
            lock_storage: self.lock_storage.unwrap_or(defaults.lock_storage),
        };

        config.validate()?;
        Ok(config)
    }
}
