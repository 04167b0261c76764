//! Adapters Layer
//!
//! Filesystem-facing code: the persisted image store, the file-resident bit
//! array and the advisory process lock.

pub mod lock;
pub mod storage;

pub use lock::StorageLock;
pub use storage::{BitStorage, FileBitArray, PersistedImage};
