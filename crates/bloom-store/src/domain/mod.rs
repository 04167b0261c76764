//! Domain Layer - Pure logic
//!
//! This layer contains:
//! - Capacity planning (`parameters`)
//! - Double-hashing hash family (`hash_functions`)
//! - In-memory bit array (`bit_array`)
//! - Persisted image header codec (`image`)
//! - Configuration (`config`)
//!
//! RULES:
//! - No I/O operations
//! - Pure functions where possible

pub mod bit_array;
pub mod config;
pub mod hash_functions;
pub mod image;
pub mod parameters;

pub use bit_array::BitArray;
pub use config::{BloomConfig, BloomConfigBuilder, StorageMode};
pub use hash_functions::{compute_hash_positions, HashFamily, HashIndices};
pub use image::{ImageHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use parameters::{calculate_fpr, optimal_k, plan, FilterParameters};
