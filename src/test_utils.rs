//! Test doubles for the document engine
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! scenario tests under `tests/`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use crate::document::{DocumentError, DocumentHandle, check_page};
use crate::geometry::{DocRect, PageSize, PageTransform, Rotation};

/// Layout of the synthetic text used by [`FakeDocument::find_text`]
pub const GLYPH_WIDTH: f32 = 6.0;
pub const LINE_HEIGHT: f32 = 14.0;
pub const TEXT_LEFT: f32 = 10.0;
pub const TEXT_TOP: f32 = 20.0;
const GLYPH_HEIGHT: f32 = 12.0;

/// Holds rasterization calls until opened, so tests can keep jobs in flight
#[derive(Clone, Debug, Default)]
pub struct RenderGate {
    inner: Arc<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl RenderGate {
    /// A gate that blocks every render until [`open`](Self::open) is called
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.lock().open = true;
        self.inner.changed.notify_all();
    }

    /// Renders currently held at the gate
    #[must_use]
    pub fn blocked(&self) -> usize {
        self.lock().waiting
    }

    /// Wait until at least `count` renders are held at the gate
    pub fn wait_until_blocked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.waiting < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = self
                .inner
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn pass(&self) {
        let mut state = self.lock();
        state.waiting += 1;
        self.inner.changed.notify_all();
        while !state.open {
            state = self
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting -= 1;
        self.inner.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Synthetic document: white pages of the given sizes, plain text per page
#[derive(Debug, Default)]
pub struct FakeDocument {
    sizes: Vec<PageSize>,
    texts: Vec<String>,
    failing: HashSet<usize>,
    panicking: HashSet<usize>,
    failing_search: HashSet<usize>,
    gate: Option<RenderGate>,
    closed: AtomicBool,
    render_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    find_calls: AtomicUsize,
    rendered: Mutex<Vec<(usize, f32, Rotation)>>,
}

impl FakeDocument {
    #[must_use]
    pub fn new(sizes: Vec<PageSize>) -> Self {
        Self {
            sizes,
            ..Self::default()
        }
    }

    /// `count` pages of the same size
    #[must_use]
    pub fn uniform(count: usize, size: PageSize) -> Self {
        Self::new(vec![size; count])
    }

    /// Text of each page, in page order; lines are separated by `\n`
    #[must_use]
    pub fn with_texts<S: Into<String>>(mut self, texts: impl IntoIterator<Item = S>) -> Self {
        self.texts = texts.into_iter().map(Into::into).collect();
        self
    }

    /// Pages whose rasterization returns an error
    #[must_use]
    pub fn with_failing_pages(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(pages);
        self
    }

    /// Pages whose rasterization panics
    #[must_use]
    pub fn with_panicking_pages(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        self.panicking.extend(pages);
        self
    }

    /// Pages whose text search returns an error
    #[must_use]
    pub fn with_failing_search_pages(mut self, pages: impl IntoIterator<Item = usize>) -> Self {
        self.failing_search.extend(pages);
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: RenderGate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every `(page, scale, rotation)` passed to `rasterize`, in call order
    #[must_use]
    pub fn rendered(&self) -> Vec<(usize, f32, Rotation)> {
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn checked(&self, page: usize) -> Result<PageSize, DocumentError> {
        if self.is_closed() {
            return Err(DocumentError::Closed);
        }
        check_page(page, self.sizes.len())?;
        Ok(self.sizes[page])
    }

    fn text(&self, page: usize) -> &str {
        self.texts.get(page).map_or("", String::as_str)
    }
}

impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> Result<usize, DocumentError> {
        if self.is_closed() {
            return Err(DocumentError::Closed);
        }
        Ok(self.sizes.len())
    }

    fn page_size(&self, page: usize) -> Result<PageSize, DocumentError> {
        self.checked(page)
    }

    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbImage, DocumentError> {
        let size = self.checked(page)?;
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((page, scale, rotation));

        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if self.panicking.contains(&page) {
            panic!("synthetic panic while rendering page {page}");
        }
        if self.failing.contains(&page) {
            return Err(DocumentError::render(page, "synthetic failure"));
        }

        let (width, height) = PageTransform::new(size, scale, rotation).output_size();
        Ok(RgbImage::from_pixel(
            width.max(1),
            height.max(1),
            Rgb([255, 255, 255]),
        ))
    }

    fn extract_text(&self, page: usize) -> Result<String, DocumentError> {
        self.checked(page)?;
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text(page).to_string())
    }

    /// Case-insensitive. Glyphs sit on a fixed grid: column `c` of line `l`
    /// starts at `(TEXT_LEFT + c * GLYPH_WIDTH, TEXT_TOP + l * LINE_HEIGHT)`.
    fn find_text(&self, page: usize, term: &str) -> Result<Vec<DocRect>, DocumentError> {
        self.checked(page)?;
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_search.contains(&page) {
            return Err(DocumentError::Search {
                page,
                reason: "synthetic failure".to_string(),
            });
        }

        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let needle_chars = needle.chars().count() as f32;

        let mut rects = Vec::new();
        for (line_no, line) in self.text(page).lines().enumerate() {
            let haystack = line.to_lowercase();
            let mut start = 0;
            while let Some(pos) = haystack[start..].find(&needle) {
                let column = haystack[..start + pos].chars().count() as f32;
                let x0 = TEXT_LEFT + column * GLYPH_WIDTH;
                let y0 = TEXT_TOP + line_no as f32 * LINE_HEIGHT;
                rects.push(DocRect::new(
                    x0,
                    y0,
                    x0 + needle_chars * GLYPH_WIDTH,
                    y0 + GLYPH_HEIGHT,
                ));
                start += pos + needle.len();
            }
        }
        Ok(rects)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
