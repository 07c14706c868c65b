//! Render scheduler: which pages need rasters, and which rasters can go

use std::collections::{BTreeSet, HashMap};

use log::debug;

use super::cache::RasterCache;
use super::request::{RenderJob, RenderTag};
use crate::layout::Layout;

/// Tunables for visibility buffering and cache eviction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerParams {
    /// Pages rendered ahead of and behind the strictly visible range
    pub buffer_pages: usize,
    /// Cached pages allowed beyond the visible set
    pub cache_limit: usize,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            buffer_pages: super::DEFAULT_BUFFER_PAGES,
            cache_limit: super::DEFAULT_CACHE_LIMIT,
        }
    }
}

/// Pages intersecting `[scroll_y, scroll_y + viewport_height]`, widened by
/// `buffer` pages on each side and clamped to the document.
#[must_use]
pub fn determine_visible(
    layout: &Layout,
    scroll_y: u32,
    viewport_height: i32,
    buffer: usize,
) -> BTreeSet<usize> {
    let slots = layout.slots();
    if slots.is_empty() {
        return BTreeSet::new();
    }
    let top = scroll_y;
    let bottom = scroll_y.saturating_add(viewport_height.max(0) as u32);

    // Slot tops and bottoms both increase monotonically.
    let first = slots.partition_point(|slot| slot.bottom() < top);
    let end = slots.partition_point(|slot| slot.y <= bottom);
    if first >= end {
        return BTreeSet::new();
    }
    let last = end - 1;

    let start = first.saturating_sub(buffer);
    let stop = last.saturating_add(buffer).min(slots.len() - 1);
    (start..=stop).collect()
}

/// Tracks in-flight jobs and decides what to submit or evict
#[derive(Debug, Default)]
pub struct RenderScheduler {
    params: SchedulerParams,
    in_flight: HashMap<usize, RenderTag>,
}

impl RenderScheduler {
    #[must_use]
    pub fn new(params: SchedulerParams) -> Self {
        Self {
            params,
            in_flight: HashMap::new(),
        }
    }

    #[must_use]
    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Visible set for the current viewport, buffer included
    #[must_use]
    pub fn visible_pages(
        &self,
        layout: &Layout,
        scroll_y: u32,
        viewport_height: i32,
    ) -> BTreeSet<usize> {
        determine_visible(layout, scroll_y, viewport_height, self.params.buffer_pages)
    }

    /// Jobs needed so every page in `visible` ends up with a raster for its
    /// current tag. Without `force`, pages already cached or already in flight
    /// for that tag are skipped. Returned jobs are recorded as in flight.
    pub fn request_render(
        &mut self,
        visible: &BTreeSet<usize>,
        force: bool,
        cache: &RasterCache,
        generation: u64,
        tag_for: impl Fn(usize) -> RenderTag,
    ) -> Vec<RenderJob> {
        let mut jobs = Vec::new();
        for &page in visible {
            let tag = tag_for(page);
            if !force {
                if cache.has_current(page, &tag) {
                    continue;
                }
                if self.in_flight.get(&page).is_some_and(|t| t.matches(&tag)) {
                    continue;
                }
            }
            self.in_flight.insert(page, tag);
            jobs.push(RenderJob {
                page,
                tag,
                generation,
            });
        }
        if !jobs.is_empty() {
            debug!(
                "Scheduling {} page(s) (force={force}, generation={generation})",
                jobs.len()
            );
        }
        jobs
    }

    /// Forget an in-flight job once its response arrived. Returns whether a job
    /// with a matching tag was outstanding.
    pub fn complete(&mut self, page: usize, tag: &RenderTag) -> bool {
        match self.in_flight.get(&page) {
            Some(pending) if pending.matches(tag) => {
                self.in_flight.remove(&page);
                true
            }
            _ => false,
        }
    }

    /// Forget every in-flight job (their results will be judged stale or not
    /// on arrival)
    pub fn cancel_all(&mut self) {
        self.in_flight.clear();
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn is_in_flight(&self, page: usize) -> bool {
        self.in_flight.contains_key(&page)
    }

    /// Evict old rasters once the cache holds more than `|visible| + cache_limit`
    /// entries. Oldest-accepted entries outside `visible` go first; normally up
    /// to `cache_limit` of them, more if that is what it takes to get back under
    /// the bound. Returns the evicted pages.
    pub fn manage_cache(&self, cache: &mut RasterCache, visible: &BTreeSet<usize>) -> Vec<usize> {
        let bound = visible.len() + self.params.cache_limit;
        if cache.len() <= bound {
            return Vec::new();
        }
        let excess = cache.len() - bound;
        let evicted = cache.evict_oldest_outside(visible, self.params.cache_limit.max(excess));
        debug!(
            "Evicted {} cached page(s), {} remain",
            evicted.len(),
            cache.len()
        );
        evicted
    }
}
