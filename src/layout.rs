//! Layout engine: where every page sits on the canvas
//!
//! Pages are stacked top to bottom, centered horizontally. The layout is a pure
//! function of the page sizes, the view state and the viewport width.

use crate::geometry::{CanvasRect, DocRect, PageSize, PageTransform, Rotation};
use crate::view_state::ViewState;

/// Fixed spacing around pages on the canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutParams {
    /// Gap above the first page
    pub top_margin: u32,
    /// Gap between consecutive pages
    pub spacing: u32,
}

impl LayoutParams {
    pub const DEFAULT_TOP_MARGIN: u32 = 10;
    pub const DEFAULT_SPACING: u32 = 20;
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            top_margin: Self::DEFAULT_TOP_MARGIN,
            spacing: Self::DEFAULT_SPACING,
        }
    }
}

/// Scale a page is displayed and rasterized at.
///
/// This is the only place the scale is derived; layout, render requests,
/// staleness checks and highlight mapping all go through it.
#[must_use]
pub fn effective_scale(page: PageSize, view: &ViewState, viewport_width: i32) -> f32 {
    if view.fit_to_width && page.width > 0.0 && viewport_width > 0 {
        (viewport_width as f32 / page.width) * view.zoom
    } else {
        view.zoom
    }
}

/// On-canvas placement of one page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSlot {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Effective scale the slot was sized with
    pub scale: f32,
}

impl PageSlot {
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Whether the slot's vertical extent touches `[top, bottom]`
    #[must_use]
    pub fn intersects(&self, top: u32, bottom: u32) -> bool {
        self.bottom() >= top && self.y <= bottom
    }
}

/// Positions of every page for one view state and viewport width
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    slots: Vec<PageSlot>,
    total_height: u32,
    viewport_width: u32,
}

impl Layout {
    /// Lay out `pages`. A viewport that has not been measured yet
    /// (`viewport_width <= 0`) produces an empty layout.
    #[must_use]
    pub fn compute(
        pages: &[PageSize],
        view: &ViewState,
        viewport_width: i32,
        params: &LayoutParams,
    ) -> Self {
        if viewport_width <= 0 || pages.is_empty() {
            return Self::default();
        }
        let canvas_width = viewport_width as u32;

        let mut slots = Vec::with_capacity(pages.len());
        let mut y = params.top_margin;
        for &page in pages {
            let scale = effective_scale(page, view, viewport_width);
            let (width, height) = PageTransform::new(page, scale, view.rotation).output_size();
            slots.push(PageSlot {
                x: canvas_width.saturating_sub(width) / 2,
                y,
                width,
                height,
                scale,
            });
            y = y.saturating_add(height).saturating_add(params.spacing);
        }

        Self {
            slots,
            total_height: y,
            viewport_width: canvas_width,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, page: usize) -> Option<&PageSlot> {
        self.slots.get(page)
    }

    /// Height of the scrollable content
    #[must_use]
    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    #[must_use]
    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    /// Largest scroll offset that still fills the viewport
    #[must_use]
    pub fn max_scroll(&self, viewport_height: i32) -> u32 {
        self.total_height
            .saturating_sub(viewport_height.max(0) as u32)
    }

    /// Last page whose top edge is at or above `y`
    #[must_use]
    pub fn page_at(&self, y: u32) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let after = self.slots.partition_point(|slot| slot.y <= y);
        Some(after.saturating_sub(1))
    }

    /// Canvas-space rectangle for a document-space rectangle on `page`
    #[must_use]
    pub fn highlight_rect(
        &self,
        page: usize,
        size: PageSize,
        rotation: Rotation,
        rect: DocRect,
    ) -> Option<CanvasRect> {
        let slot = self.slot(page)?;
        let mapped = PageTransform::new(size, slot.scale, rotation).apply_rect(rect);
        Some(CanvasRect::new(
            mapped.x + slot.x as f32,
            mapped.y + slot.y as f32,
            mapped.width,
            mapped.height,
        ))
    }
}
