use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;
use crate::persist;

/// Auto-serialisation and on-disk path policy (§4.8). Defaults chosen so a
/// long-running application serialises periodically without writing to disk
/// on every single compile.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub path: Option<PathBuf>,
    pub auto_serialize_entries: usize,
    pub auto_serialize_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            path: None,
            auto_serialize_entries: 64,
            auto_serialize_interval: Duration::from_secs(30),
        }
    }
}

struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashSet<CacheKey>,
    entries_since_serialize: usize,
    last_serialize: Instant,
}

/// The shader/pipeline cache (C8). At most one build runs per key at a time
/// (§4.8, §8 S4): a second caller for the same key blocks on `build_done`
/// until the first finishes, then picks up the now-populated entry, mirroring
/// the `Mutex` + `Condvar` pattern the teacher's submission queue uses for
/// its own "wait until idle" rendezvous.
pub struct ShaderCache {
    inner: Mutex<Inner>,
    build_done: Condvar,
    config: CacheConfig,
}

impl ShaderCache {
    pub fn new(config: CacheConfig) -> Self {
        let entries = config
            .path
            .as_deref()
            .map(persist::deserialize_from)
            .unwrap_or_default();
        ShaderCache {
            inner: Mutex::new(Inner {
                entries,
                in_flight: HashSet::new(),
                entries_since_serialize: 0,
                last_serialize: Instant::now(),
            }),
            build_done: Condvar::new(),
            config,
        }
    }

    pub fn get(&self, key: CacheKey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached entry for `key`, building it via `build` if absent.
    /// If another thread is already building the same key, this call blocks
    /// on the shared condition variable rather than racing a second build.
    pub fn get_or_build(&self, key: CacheKey, build: impl FnOnce() -> CacheEntry) -> CacheEntry {
        loop {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&key) {
                return entry.clone();
            }
            if inner.in_flight.contains(&key) {
                self.build_done.wait(&mut inner);
                continue;
            }
            inner.in_flight.insert(key);
            drop(inner);

            let entry = build();

            let mut inner = self.inner.lock();
            inner.in_flight.remove(&key);
            inner.entries.insert(key, entry.clone());
            inner.entries_since_serialize += 1;
            let should_serialize = inner.entries_since_serialize >= self.config.auto_serialize_entries
                || inner.last_serialize.elapsed() >= self.config.auto_serialize_interval;
            drop(inner);
            self.build_done.notify_all();

            if should_serialize {
                self.serialize_now();
            }
            return entry;
        }
    }

    /// Forces an immediate on-disk serialisation, resetting the
    /// auto-serialise counters regardless of whether it succeeds -- a
    /// write failure shouldn't make every subsequent build retry the write.
    pub fn serialize_now(&self) -> Result<()> {
        let Some(path) = self.config.path.clone() else { return Ok(()) };
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.entries_since_serialize = 0;
            inner.last_serialize = Instant::now();
            inner.entries.clone()
        };
        persist::serialize_to(&path, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn key(n: u64) -> CacheKey {
        CacheKey { content_hash: n, feature_mask: 0, pipeline_version: 1 }
    }

    #[test]
    fn second_lookup_for_a_cached_key_never_rebuilds() {
        let cache = ShaderCache::new(CacheConfig::default());
        let build_count = AtomicUsize::new(0);
        let entry = cache.get_or_build(key(1), || {
            build_count.fetch_add(1, Ordering::SeqCst);
            CacheEntry::new(vec![1, 2, 3])
        });
        let entry_again = cache.get_or_build(key(1), || {
            build_count.fetch_add(1, Ordering::SeqCst);
            CacheEntry::new(vec![9, 9, 9])
        });
        assert_eq!(build_count.load(Ordering::SeqCst), 1);
        assert_eq!(entry, entry_again);
    }

    #[test]
    fn concurrent_requests_for_the_same_key_build_exactly_once() {
        let cache = Arc::new(ShaderCache::new(CacheConfig::default()));
        let build_count = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let build_count = build_count.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_build(key(7), || {
                        build_count.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        CacheEntry::new(vec![7])
                    })
                })
            })
            .collect();

        let results: Vec<CacheEntry> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(build_count.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == CacheEntry::new(vec![7])));
    }
}
