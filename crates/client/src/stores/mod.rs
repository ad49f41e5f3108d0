//! Cache side of the live-update channel.
//!
//! The channel never reads or writes cached data itself. It only tells the
//! cache which keys went stale through [`CacheInvalidator`]; consumers notice
//! on their next read and re-fetch.

pub mod query_cache;

pub use query_cache::{CachedQuery, QueryCache};

use pulse_shared::QueryKey;

/// Port through which routed events reach the application's data cache.
///
/// Called once per resolved key per received message. Implementations must
/// tolerate repeated invalidation of the same key.
pub trait CacheInvalidator {
    fn invalidate(&self, key: &QueryKey);
}

impl<F> CacheInvalidator for F
where
    F: Fn(&QueryKey),
{
    fn invalidate(&self, key: &QueryKey) {
        self(key)
    }
}
