//! LRU cache fronting the attribute pager.
//!
//! Entries cache both presence and absence. Writes land in the cache and
//! are tracked in a dirty set; a dirty entry reaches the file when it is
//! evicted or when a checkpoint flushes everything.

use std::num::NonZeroUsize;

use fnv::FnvHashSet;
use lru::LruCache;
use tracing::trace;

use common::err::CResult;

use super::pager::AtrPager;
use super::AttrValue;

pub struct AtrCache {
    lru: LruCache<u64, Option<AttrValue>>,
    dirty: FnvHashSet<u64>,
    pager: AtrPager,
}

impl std::fmt::Debug for AtrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtrCache")
            .field("entries", &self.lru.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl AtrCache {
    pub fn new(pager: AtrPager, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(2)).unwrap_or(NonZeroUsize::MIN);
        AtrCache {
            lru: LruCache::new(capacity),
            dirty: FnvHashSet::default(),
            pager,
        }
    }

    pub fn get(&mut self, key: u64) -> CResult<Option<AttrValue>> {
        if let Some(v) = self.lru.get(&key) {
            return Ok(v.clone());
        }
        let fetched = self.pager.fetch(key)?;
        trace!(key, hit = false, "attribute cache fill");
        self.insert(key, fetched.clone(), false)?;
        Ok(fetched)
    }

    pub fn put(&mut self, key: u64, value: AttrValue) {
        // A write failure surfaces at flush time; the cache itself
        // cannot fail here.
        let _ = self.insert(key, Some(value), true);
    }

    pub fn delete(&mut self, key: u64) {
        let _ = self.insert(key, None, true);
    }

    fn insert(&mut self, key: u64, value: Option<AttrValue>, dirty: bool) -> CResult<()> {
        if dirty {
            self.dirty.insert(key);
        }
        if let Some((old_key, old_val)) = self.lru.push(key, value) {
            if old_key != key && self.dirty.remove(&old_key) {
                self.write_back(old_key, old_val.as_ref())?;
            }
        }
        Ok(())
    }

    fn write_back(&mut self, key: u64, value: Option<&AttrValue>) -> CResult<()> {
        match value {
            Some(v) => self.pager.put(key, v),
            None => self.pager.delete(key),
        }
    }

    /// Write every dirty entry through and sync the file.
    pub fn flush_all(&mut self) -> CResult<()> {
        let keys: Vec<u64> = self.dirty.iter().copied().collect();
        for key in keys {
            let value = self.lru.peek(&key).cloned().flatten();
            self.write_back(key, value.as_ref())?;
            self.dirty.remove(&key);
        }
        self.pager.sync()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Every key on disk or dirty in memory.
    pub fn all_keys(&mut self) -> CResult<Vec<u64>> {
        let mut keys: FnvHashSet<u64> = self.pager.all_keys()?.into_iter().collect();
        for key in &self.dirty {
            match self.lru.peek(key) {
                Some(Some(_)) => {
                    keys.insert(*key);
                }
                Some(None) => {
                    keys.remove(key);
                }
                None => {}
            }
        }
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attr::{pack_key, AttrFlags};

    fn temp_cache(name: &str, capacity: usize) -> (AtrCache, std::path::PathBuf) {
        let mut p = std::env::temp_dir();
        p.push(format!("mux-cache-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        let pager = AtrPager::open(&p, 32).unwrap();
        (AtrCache::new(pager, capacity), p)
    }

    fn v(text: &str) -> AttrValue {
        AttrValue::new(text, 1, AttrFlags::empty())
    }

    #[test]
    fn test_read_through_and_negative_cache() {
        let (mut cache, path) = temp_cache("read", 8);
        let key = pack_key(1, 256);
        assert!(cache.get(key).unwrap().is_none());
        // The miss is cached; no dirty entry appears.
        assert_eq!(cache.dirty_count(), 0);
        cache.put(key, v("cached"));
        assert_eq!(cache.get(key).unwrap().unwrap().text, "cached");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_eviction_writes_dirty_through() {
        let (mut cache, path) = temp_cache("evict", 2);
        let a = pack_key(1, 256);
        cache.put(a, v("first"));
        // Push enough entries to evict `a`.
        cache.put(pack_key(2, 256), v("second"));
        cache.put(pack_key(3, 256), v("third"));
        // `a` must have reached the pager.
        assert_eq!(cache.pager.fetch(a).unwrap().unwrap().text, "first");
        assert_eq!(cache.get(a).unwrap().unwrap().text, "first");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_flush_all() {
        let (mut cache, path) = temp_cache("flush", 16);
        let a = pack_key(1, 256);
        let b = pack_key(2, 256);
        cache.put(a, v("one"));
        cache.put(b, v("two"));
        assert_eq!(cache.dirty_count(), 2);
        cache.flush_all().unwrap();
        assert_eq!(cache.dirty_count(), 0);
        assert_eq!(cache.pager.fetch(b).unwrap().unwrap().text, "two");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_delete_reaches_disk() {
        let (mut cache, path) = temp_cache("delete", 16);
        let a = pack_key(5, 256);
        cache.put(a, v("doomed"));
        cache.flush_all().unwrap();
        cache.delete(a);
        cache.flush_all().unwrap();
        assert!(cache.pager.fetch(a).unwrap().is_none());
        assert!(cache.get(a).unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_all_keys_merges_dirty_state() {
        let (mut cache, path) = temp_cache("keys", 16);
        let a = pack_key(1, 256);
        let b = pack_key(2, 256);
        cache.put(a, v("on disk"));
        cache.flush_all().unwrap();
        cache.put(b, v("only dirty"));
        cache.delete(a);
        let mut keys = cache.all_keys().unwrap();
        keys.sort_unstable();
        assert_eq!(keys, vec![b]);
        let _ = std::fs::remove_file(&path);
    }
}
