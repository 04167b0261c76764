//! Bloom filter engine
//!
//! Composes the planner, hash family and a bit store behind one
//! `parking_lot::RwLock`. `add` and `merge` take the write lock; `contains`
//! and the accessors share the read lock. Flushes take the upgradable read
//! lock, so they run alongside lookups but never alongside each other or an
//! insert.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, error, info, warn};

use crate::adapters::lock::StorageLock;
use crate::adapters::storage::{file, BitStorage, FileBitArray};
use crate::domain::bit_array::BitArray;
use crate::domain::config::{BloomConfig, StorageMode};
use crate::domain::hash_functions::HashFamily;
use crate::domain::image::{ImageHeader, HEADER_LEN};
use crate::domain::parameters::FilterParameters;
use crate::error::{FilterError, FilterResult};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::inbound::MembershipFilter;
use crate::ports::outbound::BitStore;

/// Mutable part of a filter
struct FilterState {
    bits: BitStorage,
    /// Calls to `add`, not distinct keys
    items_added: u64,
    /// Changed since the last load or flush to `storage_path`
    dirty: bool,
}

/// A persistent Bloom filter
///
/// `contains` never returns `false` for a key that was added. It returns
/// `true` for a key that was never added with probability close to the
/// configured false positive rate while `items_added <= expected_items`,
/// rising past that.
///
/// # Example
///
/// ```
/// use bloom_store::BloomFilter;
///
/// let filter = BloomFilter::new(1_000, 0.01).unwrap();
/// filter.add("alice").unwrap();
/// assert!(filter.contains("alice").unwrap());
/// ```
pub struct BloomFilter {
    parameters: FilterParameters,
    hasher: HashFamily,
    state: RwLock<FilterState>,
    storage_path: Option<PathBuf>,
    flush_on_drop: bool,
    metrics: Arc<dyn MetricsRecorder>,
    /// Released after the drop-time flush
    _lock: Option<StorageLock>,
}

impl BloomFilter {
    /// In-memory filter sized for `expected_items` at `false_positive_rate`
    pub fn new(expected_items: u64, false_positive_rate: f64) -> FilterResult<Self> {
        Self::from_config(&BloomConfig::new(expected_items, false_positive_rate)?)
    }

    /// Memory-backed filter persisted at `path`
    ///
    /// Loads `path` if it exists, otherwise starts empty. The image is written
    /// on `flush`, `close` or drop.
    pub fn open(
        expected_items: u64,
        false_positive_rate: f64,
        path: impl AsRef<Path>,
    ) -> FilterResult<Self> {
        Self::from_config(
            &BloomConfig::new(expected_items, false_positive_rate)?.with_storage_path(path),
        )
    }

    /// Filter whose bits live in the image file at `path`
    pub fn open_direct(
        expected_items: u64,
        false_positive_rate: f64,
        path: impl AsRef<Path>,
    ) -> FilterResult<Self> {
        Self::from_config(
            &BloomConfig::new(expected_items, false_positive_rate)?
                .with_storage_path(path)
                .with_storage_mode(StorageMode::Direct),
        )
    }

    pub fn from_config(config: &BloomConfig) -> FilterResult<Self> {
        Self::from_config_with_metrics(config, Arc::new(NoOpMetrics))
    }

    /// Build a filter, reporting its creation or load to `metrics`
    pub fn from_config_with_metrics(
        config: &BloomConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> FilterResult<Self> {
        config.validate()?;
        let planned = config.parameters()?;

        let lock = match &config.storage_path {
            Some(path) if config.lock_storage => Some(StorageLock::acquire(path)?),
            _ => None,
        };

        let existing = config.storage_path.as_deref().filter(|path| path.exists());
        let (parameters, state) = match (existing, &config.storage_path) {
            (Some(path), _) => {
                let (header, bits) = match config.storage_mode {
                    StorageMode::Memory => {
                        let image = file::load(path)?;
                        (image.header, BitStorage::Memory(image.bits))
                    }
                    StorageMode::Direct => {
                        let (bits, header) = FileBitArray::open(path)?;
                        (header, BitStorage::Direct(bits))
                    }
                };
                reconcile(path, &planned, &header, config.strict_parameters)?;
                metrics.record_filter_loaded(header.parameters.bit_count, header.items_added);
                let state = FilterState {
                    bits,
                    items_added: header.items_added,
                    dirty: false,
                };
                (header.parameters, state)
            }
            (None, path) => {
                let (bits, dirty) = match (config.storage_mode, path) {
                    (StorageMode::Direct, Some(path)) => {
                        let (bits, _) = FileBitArray::create(path, &planned)?;
                        (BitStorage::Direct(bits), false)
                    }
                    // A new image is owed to the path even if nothing is added
                    (_, path) => (
                        BitStorage::Memory(BitArray::zeroed(planned.bit_count)?),
                        path.is_some(),
                    ),
                };
                info!(
                    bit_count = planned.bit_count,
                    hash_count = planned.hash_count,
                    bytes = planned.payload_len(),
                    mode = ?config.storage_mode,
                    "Created Bloom filter"
                );
                metrics.record_filter_created(planned.bit_count, planned.hash_count);
                let state = FilterState {
                    bits,
                    items_added: 0,
                    dirty,
                };
                (planned, state)
            }
        };

        Ok(Self {
            parameters,
            hasher: HashFamily::new(),
            state: RwLock::new(state),
            storage_path: config.storage_path.clone(),
            flush_on_drop: config.flush_on_drop,
            metrics,
            _lock: lock,
        })
    }

    /// Replace the metrics recorder for subsequent operations
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Record `key` as present
    ///
    /// Adding a key twice leaves the bits unchanged but still counts toward
    /// `items_added`.
    ///
    /// # Errors
    /// Only the direct storage mode can fail here (`Io`). A failure part way
    /// through leaves some of the key's bits set and does not count the key.
    pub fn add(&self, key: impl AsRef<[u8]>) -> FilterResult<()> {
        let start = Instant::now();
        let indices = self.hasher.indices(
            key.as_ref(),
            self.parameters.hash_count,
            self.parameters.bit_count,
        );

        let mut state = self.state.write();
        state.dirty = true;
        for index in indices {
            state.bits.set(index)?;
        }
        state.items_added = state.items_added.saturating_add(1);
        drop(state);

        self.metrics.record_insert(start.elapsed());
        Ok(())
    }

    /// `false` if `key` was definitely never added
    pub fn contains(&self, key: impl AsRef<[u8]>) -> FilterResult<bool> {
        let start = Instant::now();
        let indices = self.hasher.indices(
            key.as_ref(),
            self.parameters.hash_count,
            self.parameters.bit_count,
        );

        let found = self.state.read().bits.all_ones(indices)?;

        self.metrics.record_lookup(start.elapsed(), found);
        Ok(found)
    }

    /// `(1 - e^(-k * items_added / m))^k`
    pub fn estimated_false_positive_rate(&self) -> f64 {
        self.parameters.estimated_fpr(self.items_added())
    }

    /// Write the current contents back to the storage path
    ///
    /// Always writes, even when nothing changed since the last flush.
    ///
    /// # Errors
    /// `InvalidParameters` when the filter has no storage path, `Io` on any
    /// filesystem failure.
    pub fn flush(&self) -> FilterResult<()> {
        let path = self.storage_path.as_deref().ok_or_else(|| {
            FilterError::InvalidParameters(
                "filter has no storage path; use save(path)".to_string(),
            )
        })?;
        self.write_image(path).map(|_| ())
    }

    /// Write an image of the current contents to `path`
    ///
    /// Saving to another path leaves the storage path's dirty state alone.
    pub fn save(&self, path: impl AsRef<Path>) -> FilterResult<()> {
        self.write_image(path.as_ref()).map(|_| ())
    }

    /// Flush, then release the filter and its storage lock
    ///
    /// Surfaces the flush error that a drop could only log.
    pub fn close(mut self) -> FilterResult<()> {
        let result = match self.storage_path {
            Some(_) => self.flush(),
            None => Ok(()),
        };
        self.flush_on_drop = false;
        result
    }

    /// OR `other`'s bits into this filter; `items_added` is summed
    ///
    /// Both inputs keep zero false negatives. Merging a filter into itself is
    /// a no-op.
    ///
    /// # Errors
    /// `ParameterMismatch` when `(m, k)` differ.
    pub fn merge(&self, other: &BloomFilter) -> FilterResult<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        if !self.parameters.same_layout(&other.parameters) {
            return Err(FilterError::ParameterMismatch {
                expected: (self.parameters.bit_count, self.parameters.hash_count),
                found: (other.parameters.bit_count, other.parameters.hash_count),
            });
        }

        // Never hold both locks at once
        let (payload, other_items) = {
            let other_state = other.state.read();
            (other_state.bits.to_payload()?, other_state.items_added)
        };

        let mut state = self.state.write();
        state.dirty = true;
        state.bits.or_payload(&payload)?;
        state.items_added = state.items_added.saturating_add(other_items);
        drop(state);

        self.metrics.record_merge();
        Ok(())
    }

    pub fn parameters(&self) -> FilterParameters {
        self.parameters
    }

    /// Number of `add` calls, including those before the last reload
    pub fn items_added(&self) -> u64 {
        self.state.read().items_added
    }

    /// Number of bits set to 1
    pub fn bits_set(&self) -> FilterResult<u64> {
        self.state.read().bits.count_ones()
    }

    /// Fraction of bits set to 1
    pub fn fill_ratio(&self) -> FilterResult<f64> {
        Ok(self.bits_set()? as f64 / self.parameters.bit_count as f64)
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    pub fn storage_mode(&self) -> StorageMode {
        if self.state.read().bits.is_direct() {
            StorageMode::Direct
        } else {
            StorageMode::Memory
        }
    }

    /// Whether there are changes not yet flushed to the storage path
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    fn write_image(&self, path: &Path) -> FilterResult<ImageHeader> {
        let start = Instant::now();
        let state = self.state.upgradable_read();

        // In-place header rewrites touch only the header bytes
        let (header, bytes_written) = match &state.bits {
            BitStorage::Direct(bits) if bits.is_backed_by(path) => (
                bits.write_header(&self.parameters, state.items_added)?,
                HEADER_LEN as u64,
            ),
            BitStorage::Direct(bits) => {
                let header = bits.copy_to(path, &self.parameters, state.items_added)?;
                (header, header.image_len())
            }
            BitStorage::Memory(bits) => {
                let header = file::store(path, &self.parameters, state.items_added, bits)?;
                (header, header.image_len())
            }
        };

        if state.dirty && self.is_storage_path(path) {
            let mut state = RwLockUpgradableReadGuard::upgrade(state);
            state.dirty = false;
        }

        self.metrics.record_flush(start.elapsed(), bytes_written);
        Ok(header)
    }

    fn is_storage_path(&self, path: &Path) -> bool {
        match &self.storage_path {
            Some(own) if own == path => true,
            Some(own) => match (fs::canonicalize(own), fs::canonicalize(path)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
            None => false,
        }
    }
}

/// Check a loaded header against the caller's planned parameters
fn reconcile(
    path: &Path,
    planned: &FilterParameters,
    header: &ImageHeader,
    strict: bool,
) -> FilterResult<()> {
    let found = &header.parameters;
    if !found.same_layout(planned) {
        if strict {
            return Err(FilterError::ParameterMismatch {
                expected: (planned.bit_count, planned.hash_count),
                found: (found.bit_count, found.hash_count),
            });
        }
        warn!(
            path = %path.display(),
            planned_bit_count = planned.bit_count,
            planned_hash_count = planned.hash_count,
            bit_count = found.bit_count,
            hash_count = found.hash_count,
            "Persisted filter parameters differ from requested; using persisted"
        );
    }
    if header.items_added > found.expected_items {
        warn!(
            path = %path.display(),
            items_added = header.items_added,
            expected_items = found.expected_items,
            estimated_fpr = found.estimated_fpr(header.items_added),
            "Filter holds more items than planned; false positive rate is degraded"
        );
    }
    Ok(())
}

impl Drop for BloomFilter {
    fn drop(&mut self) {
        if !self.flush_on_drop || self.storage_path.is_none() {
            return;
        }
        if !self.state.get_mut().dirty {
            debug!(path = ?self.storage_path, "Filter clean, skipping flush on drop");
            return;
        }
        if let Err(e) = self.flush() {
            error!(path = ?self.storage_path, error = %e, "Flush on drop failed");
        }
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("parameters", &self.parameters)
            .field("storage_path", &self.storage_path)
            .field("storage_mode", &self.storage_mode())
            .field("items_added", &self.items_added())
            .finish()
    }
}

impl MembershipFilter for BloomFilter {
    fn add(&self, key: &[u8]) -> FilterResult<()> {
        BloomFilter::add(self, key)
    }

    fn contains(&self, key: &[u8]) -> FilterResult<bool> {
        BloomFilter::contains(self, key)
    }

    fn estimated_false_positive_rate(&self) -> f64 {
        BloomFilter::estimated_false_positive_rate(self)
    }

    fn flush(&self) -> FilterResult<()> {
        BloomFilter::flush(self)
    }
}
