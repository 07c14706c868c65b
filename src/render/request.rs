//! Render job and result types exchanged with the workers

use std::sync::Arc;

use image::RgbImage;

use crate::geometry::Rotation;

/// Largest scale difference still considered the same render epoch
pub const SCALE_EPSILON: f32 = 1e-3;

/// The `(scale, rotation)` pair a raster or a pending job belongs to
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTag {
    pub scale: f32,
    pub rotation: Rotation,
}

impl RenderTag {
    #[must_use]
    pub const fn new(scale: f32, rotation: Rotation) -> Self {
        Self { scale, rotation }
    }

    /// Scale within [`SCALE_EPSILON`], rotation exact
    #[must_use]
    pub fn matches(&self, other: &RenderTag) -> bool {
        self.rotation == other.rotation && (self.scale - other.scale).abs() < SCALE_EPSILON
    }
}

/// One page to rasterize
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderJob {
    pub page: usize,
    pub tag: RenderTag,
    /// Worker pool generation the job was submitted under. Jobs from an older
    /// generation are skipped when dequeued.
    pub generation: u64,
}

/// A successfully rasterized page
#[derive(Clone, Debug)]
pub struct RenderResult {
    pub page: usize,
    pub tag: RenderTag,
    pub generation: u64,
    pub image: Arc<RgbImage>,
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize a page
    Render(RenderJob),

    /// Stop the receiving worker
    Shutdown,
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Rendered page
    Rendered(RenderResult),

    /// Rasterization failed; the page keeps whatever it displayed before
    Failed {
        page: usize,
        tag: RenderTag,
        reason: String,
    },
}

impl RenderResponse {
    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::Rendered(result) => result.page,
            Self::Failed { page, .. } => *page,
        }
    }

    #[must_use]
    pub fn tag(&self) -> RenderTag {
        match self {
            Self::Rendered(result) => result.tag,
            Self::Failed { tag, .. } => *tag,
        }
    }
}
