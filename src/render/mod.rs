//! Page rendering: raster cache, scheduling and the worker pool

mod cache;
mod request;
mod scheduler;
mod worker;

pub use cache::{CacheEntry, RasterCache};
pub use request::{
    RenderJob, RenderRequest, RenderResponse, RenderResult, RenderTag, SCALE_EPSILON,
};
pub use scheduler::{RenderScheduler, SchedulerParams, determine_visible};
pub use worker::{WorkerPool, render_worker};

/// Cached pages kept beyond the visible set
pub const DEFAULT_CACHE_LIMIT: usize = 20;
/// Pages rendered ahead of and behind the viewport
pub const DEFAULT_BUFFER_PAGES: usize = 2;
pub const DEFAULT_WORKERS: usize = 1;
