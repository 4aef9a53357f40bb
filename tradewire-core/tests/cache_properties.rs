//! Property tests for the TTL cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use tradewire_core::{Clock, TtlCache};

struct FixedClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl FixedClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    fn set(&self, offset: Duration) {
        *self.offset.lock().unwrap() = offset;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }
}

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        "p_[a-z]{1,6}",
        "q_[a-z]{1,6}",
        "p[a-z]{1,6}",
        "[a-z]{1,8}",
    ]
}

proptest! {
    #[test]
    fn prop_get_returns_value_iff_before_expiry(
        ttl_ms in 1u64..10_000,
        elapsed_ms in 0u64..20_000,
        value in any::<i64>(),
    ) {
        let clock = FixedClock::new();
        let cache = TtlCache::with_clock(clock.clone());
        cache.put("quote_THYAO", value, Duration::from_millis(ttl_ms));

        clock.set(Duration::from_millis(elapsed_ms));
        let got = cache.get("quote_THYAO");
        if elapsed_ms < ttl_ms {
            prop_assert_eq!(got, Some(value));
        } else {
            prop_assert_eq!(got, None);
            prop_assert!(cache.is_empty());
            cache.put("quote_THYAO", value, Duration::from_millis(ttl_ms));
            prop_assert_eq!(cache.get("quote_THYAO"), Some(value));
        }
    }

    #[test]
    fn prop_invalidate_prefix_removes_exactly_matching_keys(
        entries in prop::collection::btree_map(arb_key(), any::<u32>(), 0..24),
    ) {
        let cache = TtlCache::new();
        for (key, value) in &entries {
            cache.put(key.clone(), *value, Duration::from_secs(60));
        }

        let removed = cache.invalidate_prefix("p_");

        let expected_removed = entries.keys().filter(|k| k.starts_with("p_")).count();
        prop_assert_eq!(removed, expected_removed);
        for (key, value) in &entries {
            if key.starts_with("p_") {
                prop_assert_eq!(cache.get(key), None);
            } else {
                prop_assert_eq!(cache.get(key), Some(*value));
            }
        }
    }
}

#[test]
fn test_concurrent_writers_and_readers() {
    let cache: Arc<TtlCache<usize>> = Arc::new(TtlCache::new());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("quote_{}_{}", worker, i % 50);
                    cache.put(key.clone(), i, Duration::from_secs(60));
                    assert!(cache.get(&key).is_some());
                    if i % 100 == 0 {
                        cache.invalidate_prefix(&format!("quote_{}_", worker));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut per_worker: BTreeMap<String, usize> = BTreeMap::new();
    for worker in 0..8 {
        let prefix = format!("quote_{}_", worker);
        per_worker.insert(prefix.clone(), cache.invalidate_prefix(&prefix));
    }
    assert!(per_worker.values().all(|count| *count <= 50));
    assert!(cache.is_empty());
}

#[test]
fn test_invalidate_prefix_accounts_for_concurrent_puts() {
    let cache: Arc<TtlCache<usize>> = Arc::new(TtlCache::new());
    for i in 0..100 {
        cache.put(format!("q_{}", i), i, Duration::from_secs(60));
    }
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2_000 {
                cache.put(format!("p_{}", i), i, Duration::from_secs(60));
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut removed = 0;
    while !done.load(Ordering::SeqCst) {
        removed += cache.invalidate_prefix("p_");
    }
    writer.join().unwrap();

    let remaining = cache.invalidate_prefix("p_");
    assert_eq!(removed + remaining, 2_000);
    assert_eq!(cache.len(), 100);
    assert!((0..100).all(|i| cache.get(&format!("q_{}", i)) == Some(i)));
}
