//! # Bloom Store
//!
//! A persistent Bloom filter: "definitely absent" / "possibly present"
//! answers for a large key universe at a planned false positive rate, with
//! zero false negatives and a durable on-disk image.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `FilterParameters` / `plan`: optimal `(m, k)` from `(n, p)`
//!   - `HashFamily`: two keyed SipHash-2-4 hashes combined by double hashing
//!   - `BitArray`: in-memory packed bits
//!   - `ImageHeader`: the 48-byte persisted header
//!   - `BloomConfig` / `BloomConfigBuilder`: configuration with validation
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `MembershipFilter`: Driving port (what callers use)
//!   - `BitStore`: Driven port (where the bits live)
//!
//! - **Service Layer** (`service/`): The `BloomFilter` engine
//!
//! - **Adapters Layer** (`adapters/`): Filesystem
//!   - `storage::file`: atomic whole-image load/store
//!   - `FileBitArray`: bits read and written in the image file itself
//!   - `StorageLock`: advisory lock on `<path>.lock`
//!
//! ## Invariants
//!
//! - `contains(x)` is `true` for every `x` ever added, including after a
//!   save and reload
//! - `m` and `k` never change after creation
//! - FPR = (1 - e^(-kn/m))^k stays at or under the planned rate while
//!   `items_added <= expected_items`
//!
//! ## Usage Example
//!
//! ```no_run
//! use bloom_store::BloomFilter;
//!
//! # fn main() -> bloom_store::FilterResult<()> {
//! let filter = BloomFilter::open(100_000_000, 0.001, "/var/lib/app/seen.bloom")?;
//! filter.add("alice")?;
//! filter.add("bob")?;
//!
//! assert!(filter.contains("alice")?);
//! println!("charlie maybe present: {}", filter.contains("charlie")?);
//!
//! // Also flushed on drop; close() surfaces the error instead of logging it
//! filter.close()?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{FileBitArray, StorageLock};
pub use domain::{
    plan, BitArray, BloomConfig, BloomConfigBuilder, FilterParameters, HashFamily, StorageMode,
};
pub use error::{FilterError, FilterResult};
pub use metrics::{Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{BitStore, MembershipFilter};
pub use service::BloomFilter;
