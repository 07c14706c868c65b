//! Viewer controller
//!
//! Owns the view state, the layout, the raster cache and the render workers of
//! one document session. Every public method is an action the host forwards
//! from the UI; all of them run on the control thread. Render results come
//! back through [`Viewer::poll_results`] or [`Viewer::pump`] and are applied
//! here, one at a time, after the staleness check.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::Receiver;
use log::{debug, error, info, warn};

use crate::document::{DocumentError, DocumentHandle};
use crate::geometry::{CanvasRect, PageSize};
use crate::host::{DocumentStatus, SlotImage, Status, ViewportHost};
use crate::input::{self, InputError};
use crate::layout::{Layout, effective_scale};
use crate::render::{
    CacheEntry, RasterCache, RenderResponse, RenderScheduler, RenderTag, WorkerPool,
};
use crate::search::{SearchCoordinator, SearchHit};
use crate::settings::Settings;
use crate::view_state::{Command, Effect, ViewState};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Open(#[from] DocumentError),

    #[error("failed to start render workers: {0}")]
    Worker(#[from] io::Error),
}

/// Counters describing what happened to render work
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewerStats {
    pub jobs_submitted: usize,
    /// Results stored in the cache and shown
    pub accepted: usize,
    /// Results dropped because the view changed while they were rendered
    pub stale_discarded: usize,
    pub render_failures: usize,
    pub evicted: usize,
}

/// Measured viewport size in pixels. Zero or negative until the host has
/// measured it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

struct Session {
    doc: Arc<dyn DocumentHandle>,
    name: String,
    page_sizes: Vec<PageSize>,
    workers: WorkerPool,
}

struct PendingHighlight {
    hit: SearchHit,
    due: Instant,
}

/// Tag a page has to be rendered with under the live view state
fn render_tag(size: PageSize, view: &ViewState, viewport_width: i32) -> RenderTag {
    RenderTag::new(effective_scale(size, view, viewport_width), view.rotation)
}

pub struct Viewer<H: ViewportHost> {
    host: H,
    settings: Settings,
    session: Option<Session>,
    view: ViewState,
    viewport: Viewport,
    scroll_y: u32,
    layout: Layout,
    cache: RasterCache,
    scheduler: RenderScheduler,
    search: SearchCoordinator,
    pending_highlight: Option<PendingHighlight>,
    stats: ViewerStats,
}

impl<H: ViewportHost> Viewer<H> {
    pub fn new(host: H, settings: Settings) -> Self {
        let settings = settings.sanitized();
        let mut viewer = Self {
            host,
            view: ViewState::new(settings.fit_to_width, settings.zoom_step),
            scheduler: RenderScheduler::new(settings.scheduler_params()),
            settings,
            session: None,
            viewport: Viewport::default(),
            scroll_y: 0,
            layout: Layout::default(),
            cache: RasterCache::new(),
            search: SearchCoordinator::new(),
            pending_highlight: None,
            stats: ViewerStats::default(),
        };
        viewer.push_status();
        viewer
    }

    // ==================== DOCUMENT LIFECYCLE ====================

    /// Replace the current document with the one `opener` produces.
    ///
    /// The previous document is shut down (workers stopped, handle closed)
    /// before `opener` runs. If opening fails the host is told so and the
    /// viewer is left without a document.
    pub fn load_document<F>(&mut self, name: impl Into<String>, opener: F) -> Result<(), ViewerError>
    where
        F: FnOnce() -> Result<Arc<dyn DocumentHandle>, DocumentError>,
    {
        let name = name.into();
        self.close_document();

        let session = opener()
            .map_err(ViewerError::from)
            .and_then(|doc| self.start_session(name.clone(), doc));
        let session = match session {
            Ok(session) => session,
            Err(err) => {
                error!("Could not open {name}: {err}");
                self.host.show_error(&format!("Could not open {name}: {err}"));
                self.push_status();
                return Err(err);
            }
        };

        info!(
            "Opened {} ({} pages, {} render worker(s))",
            session.name,
            session.page_sizes.len(),
            session.workers.worker_count()
        );
        let page_count = session.page_sizes.len();
        self.session = Some(session);

        let effects = self.view.apply(Command::Reset { page_count });
        self.run_effects(effects);
        Ok(())
    }

    /// Open a PDF file with MuPDF
    #[cfg(feature = "pdf")]
    pub fn load_path(&mut self, path: &std::path::Path) -> Result<(), ViewerError> {
        use crate::document::MupdfDocument;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.load_document(name, || {
            MupdfDocument::open(path).map(|doc| Arc::new(doc) as Arc<dyn DocumentHandle>)
        })
    }

    fn start_session(
        &self,
        name: String,
        doc: Arc<dyn DocumentHandle>,
    ) -> Result<Session, ViewerError> {
        let page_sizes: Result<Vec<PageSize>, DocumentError> = doc
            .page_count()
            .and_then(|count| (0..count).map(|page| doc.page_size(page)).collect());
        let page_sizes = match page_sizes {
            Ok(sizes) => sizes,
            Err(err) => {
                doc.close();
                return Err(err.into());
            }
        };

        let workers = match WorkerPool::spawn(Arc::clone(&doc), self.settings.workers) {
            Ok(workers) => workers,
            Err(err) => {
                doc.close();
                return Err(err.into());
            }
        };

        Ok(Session {
            doc,
            name,
            page_sizes,
            workers,
        })
    }

    /// Close the current document and show "no document"
    pub fn close_document(&mut self) {
        self.end_session();

        self.cache.clear();
        self.scheduler.cancel_all();
        self.search.reset();
        self.pending_highlight = None;
        self.layout = Layout::default();
        self.scroll_y = 0;
        let _ = self.view.apply(Command::Reset { page_count: 0 });

        self.host.clear_highlights();
        self.host.clear_slots();
        self.host.set_scroll_region(0, 0);
        self.host.scroll_to(0);
        self.push_status();
    }

    /// Stop the workers, wait for them (bounded), release the document
    fn end_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.workers.stop();
        if !session.workers.join(self.settings.shutdown_timeout()) {
            warn!(
                "Render workers for {} did not stop in time, closing anyway",
                session.name
            );
        }
        session.doc.close();
        info!("Closed {}", session.name);
    }

    // ==================== VIEWPORT ====================

    /// The host measured a new viewport size
    pub fn resize(&mut self, width: i32, height: i32) {
        let width_changed = width != self.viewport.width;
        self.viewport = Viewport { width, height };
        if self.session.is_none() {
            return;
        }

        if width_changed {
            self.relayout();
        } else {
            self.apply_scroll(self.scroll_y);
        }
    }

    pub fn scroll_to(&mut self, y: u32) {
        self.apply_scroll(y);
    }

    pub fn scroll_by(&mut self, delta: i64) {
        let target = (i64::from(self.scroll_y) + delta).max(0);
        self.apply_scroll(u32::try_from(target).unwrap_or(u32::MAX));
    }

    fn apply_scroll(&mut self, y: u32) {
        self.scroll_y = y.min(self.layout.max_scroll(self.viewport.height));
        self.host.scroll_to(self.scroll_y);

        let center = self
            .scroll_y
            .saturating_add((self.viewport.height.max(0) / 2) as u32);
        if let Some(page) = self.layout.page_at(center) {
            if page != self.view.current_page {
                self.view.current_page = page;
                self.push_status();
            }
        }
        self.request_render_visible(false);
    }

    // ==================== VIEW ACTIONS ====================

    pub fn zoom_in(&mut self) {
        self.apply_command(Command::ZoomIn);
    }

    pub fn zoom_out(&mut self) {
        self.apply_command(Command::ZoomOut);
    }

    /// Set the zoom factor directly. Values outside the supported range are
    /// rejected and leave the view unchanged.
    pub fn set_zoom(&mut self, zoom: f32) -> Result<(), InputError> {
        let zoom = input::check_zoom(zoom)?;
        self.apply_command(Command::SetZoom(zoom));
        Ok(())
    }

    /// Zoom from the text box, e.g. `"120%"`
    pub fn set_zoom_entry(&mut self, text: &str) -> Result<(), InputError> {
        let zoom = input::parse_zoom_entry(text)?;
        self.apply_command(Command::SetZoom(zoom));
        Ok(())
    }

    pub fn rotate(&mut self) {
        self.apply_command(Command::Rotate);
    }

    pub fn set_fit_to_width(&mut self, fit: bool) {
        self.apply_command(Command::SetFitToWidth(fit));
    }

    // ==================== PAGE NAVIGATION ====================

    pub fn next_page(&mut self) {
        let next = self.view.current_page + 1;
        if next < self.view.page_count {
            self.goto_page(next);
        }
    }

    pub fn prev_page(&mut self) {
        if let Some(prev) = self.view.current_page.checked_sub(1) {
            self.goto_page(prev);
        }
    }

    /// Jump to a 0-based page (clamped to the document)
    pub fn goto_page(&mut self, page: usize) {
        self.apply_command(Command::GoToPage(page));
    }

    /// Jump from the page box; the text is 1-based
    pub fn goto_page_entry(&mut self, text: &str) -> Result<(), InputError> {
        let page = input::parse_page_entry(text, self.view.page_count)?;
        self.goto_page(page);
        Ok(())
    }

    fn apply_command(&mut self, cmd: Command) {
        if self.session.is_none() {
            return;
        }
        let effects = self.view.apply(cmd);
        self.run_effects(effects);
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Relayout => self.relayout(),
                Effect::ScrollToPage(page) => self.scroll_to_page(page),
                Effect::UpdateStatus => self.push_status(),
            }
        }
    }

    fn scroll_to_page(&mut self, page: usize) {
        let Some(slot) = self.layout.slot(page) else {
            return;
        };
        self.scroll_y = slot.y.min(self.layout.max_scroll(self.viewport.height));
        self.host.scroll_to(self.scroll_y);
        self.request_render_visible(false);
    }

    /// Zoom, rotation, fit mode or viewport width changed: nothing rendered so
    /// far is usable any more.
    fn relayout(&mut self) {
        self.host.clear_highlights();

        if let Some(session) = &self.session {
            session.workers.invalidate();
        }
        self.scheduler.cancel_all();
        self.cache.clear();

        let Some(session) = &self.session else {
            return;
        };
        self.layout = Layout::compute(
            &session.page_sizes,
            &self.view,
            self.viewport.width,
            &self.settings.layout_params(),
        );
        debug!(
            "Relayout: {} pages, zoom {:.2}, rotation {}, content height {}",
            self.layout.len(),
            self.view.zoom,
            self.view.rotation,
            self.layout.total_height()
        );

        self.host.clear_slots();
        for (page, slot) in self.layout.slots().iter().enumerate() {
            self.host.place_slot(
                page,
                CanvasRect::new(
                    slot.x as f32,
                    slot.y as f32,
                    slot.width as f32,
                    slot.height as f32,
                ),
            );
            self.host.set_slot_image(page, SlotImage::Placeholder);
        }
        self.host
            .set_scroll_region(self.layout.viewport_width(), self.layout.total_height());

        let anchor = self
            .layout
            .slot(self.view.current_page)
            .map_or(0, |slot| slot.y);
        self.scroll_y = anchor.min(self.layout.max_scroll(self.viewport.height));
        self.host.scroll_to(self.scroll_y);

        self.request_render_visible(true);
    }

    // ==================== RENDERING ====================

    /// Pages the scheduler considers visible right now, buffer included
    #[must_use]
    pub fn visible_pages(&self) -> BTreeSet<usize> {
        self.scheduler
            .visible_pages(&self.layout, self.scroll_y, self.viewport.height)
    }

    /// Make sure every visible page has (or is getting) a current raster, and
    /// trim the cache. Returns the number of jobs submitted.
    pub fn request_render_visible(&mut self, force: bool) -> usize {
        let Some(session) = &self.session else {
            return 0;
        };
        let visible = self
            .scheduler
            .visible_pages(&self.layout, self.scroll_y, self.viewport.height);

        for page in self.scheduler.manage_cache(&mut self.cache, &visible) {
            self.host.set_slot_image(page, SlotImage::Placeholder);
            self.stats.evicted += 1;
        }

        let sizes = &session.page_sizes;
        let view = &self.view;
        let width = self.viewport.width;
        let jobs = self.scheduler.request_render(
            &visible,
            force,
            &self.cache,
            session.workers.generation(),
            |page| render_tag(sizes.get(page).copied().unwrap_or_default(), view, width),
        );

        let submitted = session.workers.submit(jobs);
        self.stats.jobs_submitted += submitted;
        submitted
    }

    /// Channel render results arrive on, for hosts that want to wait on it
    /// alongside their own events
    #[must_use]
    pub fn response_receiver(&self) -> Option<&Receiver<RenderResponse>> {
        self.session
            .as_ref()
            .map(|session| session.workers.response_receiver())
    }

    /// Apply every result delivered so far without blocking. Returns the
    /// number of results accepted into the cache.
    pub fn poll_results(&mut self) -> usize {
        let responses = match &self.session {
            Some(session) => session.workers.poll_responses(),
            None => return 0,
        };
        responses
            .into_iter()
            .map(|response| usize::from(self.apply_response(response)))
            .sum()
    }

    /// Block until a result arrives, a highlight is due, or `timeout` passes;
    /// then apply everything available and draw due highlights. Returns the
    /// number of results accepted.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let mut deadline = Instant::now() + timeout;
        if let Some(pending) = &self.pending_highlight {
            deadline = deadline.min(pending.due);
        }

        let first = self.session.as_ref().and_then(|session| {
            session
                .workers
                .response_receiver()
                .recv_deadline(deadline)
                .ok()
        });
        if self.session.is_none() {
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }

        let mut accepted = first.map_or(0, |response| usize::from(self.apply_response(response)));
        accepted += self.poll_results();
        self.tick(Instant::now());
        accepted
    }

    /// Nothing in flight and no highlight waiting
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler.in_flight_len() == 0 && self.pending_highlight.is_none()
    }

    /// Pump until idle or until `timeout` passes, waking at least every
    /// `poll_interval_ms`. Returns whether the viewer went idle.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let interval = self.settings.poll_interval();
        loop {
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.pump((deadline - now).min(interval));
        }
    }

    /// Apply one result. Returns whether it was accepted.
    fn apply_response(&mut self, response: RenderResponse) -> bool {
        self.scheduler.complete(response.page(), &response.tag());

        let result = match response {
            RenderResponse::Rendered(result) => result,
            RenderResponse::Failed { page, reason, .. } => {
                debug!("Page {page} keeps its current image after a failed render: {reason}");
                self.stats.render_failures += 1;
                return false;
            }
        };

        let Some(session) = &self.session else {
            return false;
        };
        let current = session
            .page_sizes
            .get(result.page)
            .filter(|_| self.layout.slot(result.page).is_some())
            .map(|&size| render_tag(size, &self.view, self.viewport.width));
        if !current.is_some_and(|tag| tag.matches(&result.tag)) {
            debug!(
                "Discarding stale render of page {} (scale {:.3}, rotation {})",
                result.page, result.tag.scale, result.tag.rotation
            );
            self.stats.stale_discarded += 1;
            return false;
        }

        self.cache.insert(
            result.page,
            CacheEntry {
                tag: result.tag,
                image: Arc::clone(&result.image),
            },
        );
        self.host
            .set_slot_image(result.page, SlotImage::Raster(result.image));
        self.stats.accepted += 1;
        true
    }

    // ==================== SEARCH ====================

    /// Submit a search term. A blank term clears the search; the active term
    /// again moves to the next hit.
    pub fn search(&mut self, term: &str) {
        let Some(session) = &self.session else {
            return;
        };
        match self.search.submit(session.doc.as_ref(), term) {
            Some(hit) => self.jump_to_hit(hit),
            None => {
                self.pending_highlight = None;
                self.host.clear_highlights();
                self.push_status();
            }
        }
    }

    pub fn next_hit(&mut self) {
        if let Some(hit) = self.search.next_hit() {
            self.jump_to_hit(hit);
        }
    }

    pub fn prev_hit(&mut self) {
        if let Some(hit) = self.search.prev_hit() {
            self.jump_to_hit(hit);
        }
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
        self.pending_highlight = None;
        self.host.clear_highlights();
        self.push_status();
    }

    /// Highlight the current hit again once the layout has settled
    pub fn highlight_current_hit(&mut self) {
        if let Some(hit) = self.search.current_hit() {
            self.schedule_highlight(hit);
        }
    }

    fn jump_to_hit(&mut self, hit: SearchHit) {
        self.host.clear_highlights();
        self.apply_command(Command::GoToPage(hit.page));
        self.schedule_highlight(hit);
    }

    fn schedule_highlight(&mut self, hit: SearchHit) {
        let now = Instant::now();
        self.pending_highlight = Some(PendingHighlight {
            hit,
            due: now + self.settings.highlight_delay(),
        });
        self.tick(now);
    }

    /// Draw a scheduled highlight once its delay has passed
    pub fn tick(&mut self, now: Instant) {
        let Some(PendingHighlight { hit, .. }) =
            self.pending_highlight.take_if(|pending| pending.due <= now)
        else {
            return;
        };
        if let Some(rect) = self.hit_rect(&hit) {
            self.host.clear_highlights();
            self.host.draw_highlight(rect);
        }
    }

    /// Canvas rectangle of a hit under the current layout
    #[must_use]
    pub fn hit_rect(&self, hit: &SearchHit) -> Option<CanvasRect> {
        let size = *self.session.as_ref()?.page_sizes.get(hit.page)?;
        self.layout
            .highlight_rect(hit.page, size, self.view.rotation, hit.rect)
    }

    // ==================== STATUS AND ACCESSORS ====================

    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            document: self.session.as_ref().map(|session| DocumentStatus {
                name: session.name.clone(),
                page: self.view.current_page,
                page_count: self.view.page_count,
                zoom_percent: self.view.zoom_percent(),
                rotation: self.view.rotation,
            }),
            search: self.search.status(),
        }
    }

    fn push_status(&mut self) {
        let status = self.status();
        self.host.update_status(&status);
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    pub fn cache(&self) -> &RasterCache {
        &self.cache
    }

    #[must_use]
    pub fn search_state(&self) -> &SearchCoordinator {
        &self.search
    }

    #[must_use]
    pub fn scroll_y(&self) -> u32 {
        self.scroll_y
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn stats(&self) -> ViewerStats {
        self.stats
    }

    /// Jobs submitted whose result has not come back yet
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.scheduler.in_flight_len()
    }

    #[must_use]
    pub fn has_document(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn document(&self) -> Option<&Arc<dyn DocumentHandle>> {
        self.session.as_ref().map(|session| &session.doc)
    }

    #[must_use]
    pub fn document_name(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.name.as_str())
    }

    /// Intrinsic page sizes of the open document
    #[must_use]
    pub fn page_sizes(&self) -> &[PageSize] {
        self.session
            .as_ref()
            .map_or(&[], |session| session.page_sizes.as_slice())
    }
}

impl<H: ViewportHost> Drop for Viewer<H> {
    fn drop(&mut self) {
        self.end_session();
    }
}
