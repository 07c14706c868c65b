//! Viewport host contract
//!
//! The host is the UI layer around the viewer. It measures the viewport and
//! forwards user actions to [`Viewer`](crate::viewer::Viewer); in return it only
//! receives drawing commands expressed in canvas coordinates.

use std::fmt;
use std::sync::Arc;

use image::RgbImage;

use crate::geometry::{CanvasRect, Rotation};
use crate::search::SearchStatus;

/// Content of a page's display slot
#[derive(Clone, Debug, Default)]
pub enum SlotImage {
    /// Blank page, nothing rendered for the current settings yet
    #[default]
    Placeholder,
    Raster(Arc<RgbImage>),
}

impl SlotImage {
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

/// Status line contents
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Status {
    /// `None` when no document is open
    pub document: Option<DocumentStatus>,
    pub search: SearchStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentStatus {
    pub name: String,
    /// 0-based
    pub page: usize,
    pub page_count: usize,
    pub zoom_percent: u32,
    pub rotation: Rotation,
}

impl Status {
    #[must_use]
    pub fn no_document() -> Self {
        Self::default()
    }

    /// Whether the next/previous hit buttons should be enabled
    #[must_use]
    pub fn navigation_enabled(&self) -> bool {
        self.search.navigation_enabled()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(doc) = &self.document else {
            return write!(f, "No document | Page -/- | Zoom - | Rot -");
        };
        let page = if doc.page_count == 0 { 0 } else { doc.page + 1 };
        write!(
            f,
            "Page {}/{} | Zoom {}% | Rot {}",
            page,
            doc.page_count,
            doc.zoom_percent,
            doc.rotation
        )?;
        match self.search {
            SearchStatus::Inactive => Ok(()),
            status => write!(f, " | {status}"),
        }
    }
}

/// Drawing surface driven by the viewer. Every call happens on the control
/// thread.
pub trait ViewportHost {
    /// Size of the scrollable content
    fn set_scroll_region(&mut self, width: u32, height: u32);

    /// Position (or reposition) the display slot of a page
    fn place_slot(&mut self, page: usize, rect: CanvasRect);

    fn set_slot_image(&mut self, page: usize, image: SlotImage);

    /// Remove every slot, e.g. before a relayout or on document close
    fn clear_slots(&mut self);

    /// Move the viewport so `y` is its top edge
    fn scroll_to(&mut self, y: u32);

    fn draw_highlight(&mut self, rect: CanvasRect);

    fn clear_highlights(&mut self);

    fn update_status(&mut self, status: &Status);

    /// Tell the user something went wrong (e.g. a document failed to open)
    fn show_error(&mut self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(search: SearchStatus) -> Status {
        Status {
            document: Some(DocumentStatus {
                name: "manual.pdf".to_string(),
                page: 0,
                page_count: 3,
                zoom_percent: 100,
                rotation: Rotation::Deg0,
            }),
            search,
        }
    }

    #[test]
    fn status_line_formats() {
        assert_eq!(
            status(SearchStatus::Inactive).to_string(),
            "Page 1/3 | Zoom 100% | Rot 0°"
        );
        assert_eq!(
            status(SearchStatus::Hit {
                current: 1,
                total: 5
            })
            .to_string(),
            "Page 1/3 | Zoom 100% | Rot 0° | Hit 2/5"
        );
        assert_eq!(
            status(SearchStatus::NoHits).to_string(),
            "Page 1/3 | Zoom 100% | Rot 0° | no hits"
        );
    }

    #[test]
    fn empty_status_reads_no_document() {
        let status = Status::no_document();
        assert_eq!(status.to_string(), "No document | Page -/- | Zoom - | Rot -");
        assert!(!status.navigation_enabled());
    }
}
