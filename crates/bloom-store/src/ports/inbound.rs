//! Inbound Ports (Driving Ports)
//!
//! The API callers program against. `BloomFilter` implements it; a caller
//! holding `&dyn MembershipFilter` can be handed any backend.

use crate::error::FilterResult;

/// Probabilistic set membership
///
/// Keys are raw bytes. Callers must encode a key the same way for `add` and
/// `contains` (UTF-8 for strings).
pub trait MembershipFilter: Send + Sync {
    /// Record `key` as present
    fn add(&self, key: &[u8]) -> FilterResult<()>;

    /// `false` means definitely absent, `true` means possibly present
    fn contains(&self, key: &[u8]) -> FilterResult<bool>;

    /// `(1 - e^(-k * items_added / m))^k` for the current contents
    fn estimated_false_positive_rate(&self) -> f64;

    /// Persist the current contents to the filter's storage path
    fn flush(&self) -> FilterResult<()>;
}
