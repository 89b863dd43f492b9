//! Compiled template cache
//!
//! Maps a template name to its compiled [`Template`]. Entries are never
//! evicted on their own; callers invalidate them explicitly. Two threads
//! compiling the same name at once both succeed, and the first insert wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::template::Template;

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Name → compiled template map shared by every render of an environment
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<String, Arc<Template>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Template>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Template>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a compiled template
    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        let found = self.read().get(name).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `template` unless another one was stored first; returns the
    /// entry that ends up in the cache
    pub fn insert_if_absent(&self, name: &str, template: Template) -> Arc<Template> {
        self.write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(template))
            .clone()
    }

    /// Drop one entry; true if it was cached
    pub fn remove(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Environment;

    fn compile(source: &str) -> Template {
        Environment::new().compile(source).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let cache = TemplateCache::new();
        assert!(cache.get("a").is_none());

        let stored = cache.insert_if_absent("a", compile("A"));
        let fetched = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(&stored, &fetched));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = TemplateCache::new();
        let first = cache.insert_if_absent("a", compile("first"));
        let second = cache.insert_if_absent("a", compile("second"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = TemplateCache::new();
        cache.insert_if_absent("b", compile("B"));
        cache.insert_if_absent("a", compile("A"));
        assert_eq!(cache.len(), 2);

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_population() {
        let cache = Arc::new(TemplateCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.insert_if_absent("shared", compile(&i.to_string())))
            })
            .collect();
        let results: Vec<Arc<Template>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|t| Arc::ptr_eq(t, &results[0])));
        assert_eq!(cache.len(), 1);
    }
}
