//! Raster cache for rendered pages
//!
//! One entry per page, tagged with the epoch it was rendered under. Entries are
//! kept in acceptance order: reading an entry never reorders it, replacing one
//! moves it to the newest position.

use std::collections::BTreeSet;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;

use super::request::RenderTag;

/// A rendered page and the epoch it belongs to
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub tag: RenderTag,
    pub image: Arc<RgbImage>,
}

/// Page rasters owned by the control thread
pub struct RasterCache {
    entries: LruCache<usize, CacheEntry>,
}

impl Default for RasterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Look up a page without touching the insertion order
    #[must_use]
    pub fn get(&self, page: usize) -> Option<&CacheEntry> {
        self.entries.peek(&page)
    }

    /// Whether the page holds a raster for `tag`
    #[must_use]
    pub fn has_current(&self, page: usize, tag: &RenderTag) -> bool {
        self.get(page).is_some_and(|entry| entry.tag.matches(tag))
    }

    /// Store an accepted raster, returning the entry it replaced
    pub fn insert(&mut self, page: usize, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.put(page, entry)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached pages, oldest accepted first
    #[must_use]
    pub fn pages_oldest_first(&self) -> Vec<usize> {
        self.entries.iter().rev().map(|(page, _)| *page).collect()
    }

    /// Evict up to `max` of the oldest entries whose page is not in `keep`.
    /// Returns the evicted pages, oldest first.
    pub fn evict_oldest_outside(&mut self, keep: &BTreeSet<usize>, max: usize) -> Vec<usize> {
        let victims: Vec<usize> = self
            .entries
            .iter()
            .rev()
            .map(|(page, _)| *page)
            .filter(|page| !keep.contains(page))
            .take(max)
            .collect();

        for page in &victims {
            self.entries.pop(page);
        }
        victims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rotation;

    fn entry(scale: f32) -> CacheEntry {
        CacheEntry {
            tag: RenderTag::new(scale, Rotation::Deg0),
            image: Arc::new(RgbImage::new(4, 4)),
        }
    }

    #[test]
    fn cache_insert_and_get() {
        let mut cache = RasterCache::new();
        cache.insert(3, entry(1.0));

        assert!(cache.get(3).is_some());
        assert!(cache.get(4).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn has_current_checks_the_tag() {
        let mut cache = RasterCache::new();
        cache.insert(0, entry(1.0));

        assert!(cache.has_current(0, &RenderTag::new(1.0, Rotation::Deg0)));
        assert!(!cache.has_current(0, &RenderTag::new(1.2, Rotation::Deg0)));
        assert!(!cache.has_current(0, &RenderTag::new(1.0, Rotation::Deg90)));
    }

    #[test]
    fn reads_do_not_reorder_entries() {
        let mut cache = RasterCache::new();
        for page in 0..3 {
            cache.insert(page, entry(1.0));
        }
        let _ = cache.get(0);
        let _ = cache.has_current(0, &RenderTag::new(1.0, Rotation::Deg0));

        assert_eq!(cache.pages_oldest_first(), vec![0, 1, 2]);
    }

    #[test]
    fn replacing_an_entry_makes_it_newest() {
        let mut cache = RasterCache::new();
        for page in 0..3 {
            cache.insert(page, entry(1.0));
        }
        let replaced = cache.insert(0, entry(1.2));

        assert!(replaced.is_some());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.pages_oldest_first(), vec![1, 2, 0]);
    }

    #[test]
    fn eviction_skips_kept_pages_and_respects_max() {
        let mut cache = RasterCache::new();
        for page in 0..6 {
            cache.insert(page, entry(1.0));
        }
        let keep: BTreeSet<usize> = [0, 2].into_iter().collect();

        let evicted = cache.evict_oldest_outside(&keep, 2);

        assert_eq!(evicted, vec![1, 3]);
        assert_eq!(cache.pages_oldest_first(), vec![0, 2, 4, 5]);
    }

    #[test]
    fn cache_clear() {
        let mut cache = RasterCache::new();
        for page in 0..5 {
            cache.insert(page, entry(1.0));
        }

        assert_eq!(cache.len(), 5);
        cache.clear();
        assert!(cache.is_empty());
    }
}
