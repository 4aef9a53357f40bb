//! Response cache with per-entry lifetimes.
//!
//! Staleness is never hidden: `now - created_at` against the entry's ttl is
//! the only expiry test, there is no sliding expiration, and an expired entry
//! is never returned.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tradewire_core::cache::{keys, TtlCache};
//!
//! let cache = TtlCache::new();
//! cache.put(keys::daily_picks("hybrid"), 5u32, keys::TTL_DAILY_PICKS);
//! cache.put(keys::quote("THYAO"), 1u32, Duration::from_secs(30));
//!
//! // After a forced refresh, sweep every daily-picks variant.
//! cache.invalidate_prefix(&keys::prefix(keys::DAILY_PICKS));
//! assert_eq!(cache.get(&keys::daily_picks("hybrid")), None);
//! assert_eq!(cache.get(&keys::quote("THYAO")), Some(1));
//! ```

pub mod keys;
pub mod stats;
pub mod ttl;

pub use stats::CacheStats;
pub use ttl::TtlCache;
