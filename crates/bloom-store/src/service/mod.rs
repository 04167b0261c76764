//! Service Layer
//!
//! The filter engine: coordinates the hash family, a bit store and
//! persistence behind a reader-writer lock.

pub mod engine;

pub use engine::BloomFilter;
