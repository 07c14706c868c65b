//! MuPDF-backed document handle
//!
//! MuPDF documents are not thread-safe, so every thread that touches a
//! [`MupdfDocument`] keeps its own engine instance in a thread-local slot.
//! The handle itself only holds immutable metadata and a closed flag.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::RgbImage;
use log::{debug, info};
use mupdf::{Colorspace, Document, Matrix, Pixmap, TextPageFlags};

use super::{DocumentError, DocumentHandle, check_page};
use crate::geometry::{DocRect, PageSize, Rotation};

/// Upper bound on hits returned by the engine for a single page
const MAX_HITS_PER_PAGE: u32 = 512;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static OPEN_DOCUMENT: RefCell<Option<(u64, Document)>> = const { RefCell::new(None) };
}

/// Page geometry captured at open time
#[derive(Clone, Copy, Debug)]
struct PageInfo {
    size: PageSize,
    origin_x: f32,
    origin_y: f32,
}

pub struct MupdfDocument {
    path: PathBuf,
    instance: u64,
    pages: Vec<PageInfo>,
    closed: AtomicBool,
}

impl MupdfDocument {
    /// Open a document and read every page's bounds
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref().to_path_buf();
        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| DocumentError::open(&path, e.to_string()))?;
        let count = doc
            .page_count()
            .map_err(|e| DocumentError::open(&path, e.to_string()))?;

        let mut pages = Vec::with_capacity(count.max(0) as usize);
        for index in 0..count {
            let bounds = doc
                .load_page(index)
                .and_then(|page| page.bounds())
                .map_err(|e| DocumentError::open(&path, format!("page {}: {e}", index + 1)))?;
            pages.push(PageInfo {
                size: PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0),
                origin_x: bounds.x0,
                origin_y: bounds.y0,
            });
        }

        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        OPEN_DOCUMENT.with(|slot| *slot.borrow_mut() = Some((instance, doc)));
        info!("Opened {path:?} ({} pages)", pages.len());

        Ok(Self {
            path,
            instance,
            pages,
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
        self.ensure_open()?;
        check_page(page, self.pages.len())?;
        Ok(self.pages[page])
    }

    fn ensure_open(&self) -> Result<(), DocumentError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DocumentError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run `f` against this thread's engine instance, opening one if needed
    fn with_document<R>(
        &self,
        f: impl FnOnce(&Document) -> Result<R, DocumentError>,
    ) -> Result<R, DocumentError> {
        self.ensure_open()?;
        OPEN_DOCUMENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            let current = matches!(slot.as_ref(), Some((id, _)) if *id == self.instance);
            if !current {
                debug!(
                    "Opening engine instance for {:?} on {:?}",
                    self.path,
                    std::thread::current().name()
                );
                let doc = Document::open(self.path.to_string_lossy().as_ref())?;
                *slot = Some((self.instance, doc));
            }
            let (_, doc) = slot.as_ref().ok_or(DocumentError::Closed)?;
            f(doc)
        })
    }
}

impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> Result<usize, DocumentError> {
        self.ensure_open()?;
        Ok(self.pages.len())
    }

    fn page_size(&self, page: usize) -> Result<PageSize, DocumentError> {
        Ok(self.page_info(page)?.size)
    }

    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbImage, DocumentError> {
        self.page_info(page)?;
        self.with_document(|doc| {
            let loaded = doc.load_page(page as i32)?;
            let mut matrix = Matrix::new_rotate(f32::from(rotation.degrees()));
            matrix.concat(Matrix::new_scale(scale, scale));
            let pixmap = loaded.to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)?;
            pixmap_to_image(&pixmap, page)
        })
    }

    fn extract_text(&self, page: usize) -> Result<String, DocumentError> {
        self.page_info(page)?;
        self.with_document(|doc| {
            let text_page = doc
                .load_page(page as i32)?
                .to_text_page(TextPageFlags::empty())?;
            let mut text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    text.extend(line.chars().filter_map(|ch| ch.char()));
                    text.push('\n');
                }
            }
            Ok(text)
        })
    }

    fn find_text(&self, page: usize, term: &str) -> Result<Vec<DocRect>, DocumentError> {
        let info = self.page_info(page)?;
        self.with_document(|doc| {
            let quads = doc
                .load_page(page as i32)?
                .search(term, MAX_HITS_PER_PAGE)
                .map_err(|e| DocumentError::Search {
                    page,
                    reason: e.to_string(),
                })?;
            Ok(quads
                .iter()
                .map(|q| {
                    let x0 = q.ul.x.min(q.ll.x) - info.origin_x;
                    let y0 = q.ul.y.min(q.ur.y) - info.origin_y;
                    let x1 = q.ur.x.max(q.lr.x) - info.origin_x;
                    let y1 = q.ll.y.max(q.lr.y) - info.origin_y;
                    DocRect::new(x0, y0, x1, y1)
                })
                .collect())
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        OPEN_DOCUMENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(slot.as_ref(), Some((id, _)) if *id == self.instance) {
                *slot = None;
            }
        });
        info!("Closed {:?}", self.path);
    }
}

/// Copy pixmap samples into a tightly packed RGB image, dropping any extra channels
fn pixmap_to_image(pixmap: &Pixmap, page: usize) -> Result<RgbImage, DocumentError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(DocumentError::render(
            page,
            format!("unsupported pixmap format: {n} channels"),
        ));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(DocumentError::render(page, "pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    RgbImage::from_raw(width as u32, height as u32, out)
        .ok_or_else(|| DocumentError::render(page, "pixmap buffer size mismatch"))
}
