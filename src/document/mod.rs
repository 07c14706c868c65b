//! Document handle contract
//!
//! The viewer never parses or rasterizes documents itself. It talks to an engine
//! through [`DocumentHandle`], which is shared read-only between the control
//! thread (layout, search) and the render workers (rasterization).

#[cfg(feature = "pdf")]
pub mod pdf;

use std::path::PathBuf;

use image::RgbImage;

use crate::geometry::{DocRect, PageSize, Rotation};

#[cfg(feature = "pdf")]
pub use self::pdf::MupdfDocument;

/// Errors reported by a document engine
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to open {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("page {page} out of range (document has {count} pages)")]
    PageIndex { page: usize, count: usize },

    #[error("failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("text search failed on page {page}: {reason}")]
    Search { page: usize, reason: String },

    #[error("document handle used after close")]
    Closed,

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),
}

impl DocumentError {
    pub fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn render(page: usize, reason: impl Into<String>) -> Self {
        Self::Render {
            page,
            reason: reason.into(),
        }
    }
}

/// A loaded document.
///
/// Implementations must tolerate concurrent read calls from several threads.
/// After [`close`](DocumentHandle::close) every other method fails with
/// [`DocumentError::Closed`].
pub trait DocumentHandle: Send + Sync {
    /// Number of pages
    fn page_count(&self) -> Result<usize, DocumentError>;

    /// Intrinsic size of a page in document units
    fn page_size(&self, page: usize) -> Result<PageSize, DocumentError>;

    /// Rasterize a page. Rotation is applied before scale; the output has no
    /// alpha channel.
    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        rotation: Rotation,
    ) -> Result<RgbImage, DocumentError>;

    /// Plain text of a page
    fn extract_text(&self, page: usize) -> Result<String, DocumentError>;

    /// Occurrences of `term` on a page, in reading order, in document space
    fn find_text(&self, page: usize, term: &str) -> Result<Vec<DocRect>, DocumentError>;

    /// Release engine resources. Calling it more than once is harmless.
    fn close(&self);
}

/// Bounds check shared by engine implementations
pub fn check_page(page: usize, count: usize) -> Result<(), DocumentError> {
    if page < count {
        Ok(())
    } else {
        Err(DocumentError::PageIndex { page, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_page_rejects_out_of_range() {
        assert!(check_page(0, 3).is_ok());
        assert!(check_page(2, 3).is_ok());
        let err = check_page(3, 3).unwrap_err();
        assert!(matches!(err, DocumentError::PageIndex { page: 3, count: 3 }));
        assert_eq!(err.to_string(), "page 3 out of range (document has 3 pages)");
    }

    #[test]
    fn open_error_names_the_path() {
        let err = DocumentError::open("/tmp/missing.pdf", "no such file");
        assert_eq!(err.to_string(), "failed to open /tmp/missing.pdf: no such file");
    }
}
