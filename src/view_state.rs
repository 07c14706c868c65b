//! View state management
//!
//! Zoom, rotation, fit mode and current page. The state only changes through
//! [`ViewState::apply`], which reports what the controller has to do about it.

use crate::geometry::Rotation;

/// Current view settings for a document
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    /// Zoom factor (1.0 = 100%), always within [`MIN_ZOOM`, `MAX_ZOOM`]
    pub zoom: f32,

    /// Clockwise page rotation
    pub rotation: Rotation,

    /// Scale pages so their width matches the viewport before zooming
    pub fit_to_width: bool,

    /// Current page (0-indexed)
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// Multiplier applied by one zoom step
    pub zoom_step: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(true, ViewState::DEFAULT_ZOOM_STEP)
    }
}

impl ViewState {
    /// Minimum allowed zoom factor
    pub const MIN_ZOOM: f32 = 0.1;
    /// Maximum allowed zoom factor
    pub const MAX_ZOOM: f32 = 5.0;
    /// Zoom rate multiplier per step - 20%
    pub const DEFAULT_ZOOM_STEP: f32 = 1.2;

    #[must_use]
    pub fn new(fit_to_width: bool, zoom_step: f32) -> Self {
        Self {
            zoom: 1.0,
            rotation: Rotation::Deg0,
            fit_to_width,
            current_page: 0,
            page_count: 0,
            zoom_step,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::ZoomIn => self.set_zoom(self.zoom * self.zoom_step),

            Command::ZoomOut => self.set_zoom(self.zoom / self.zoom_step),

            Command::SetZoom(zoom) => self.set_zoom(zoom),

            Command::Rotate => {
                self.rotation = self.rotation.rotated_cw();
                vec![Effect::Relayout, Effect::UpdateStatus]
            }

            Command::SetFitToWidth(fit) => {
                if self.fit_to_width != fit {
                    self.fit_to_width = fit;
                    vec![Effect::Relayout, Effect::UpdateStatus]
                } else {
                    vec![]
                }
            }

            Command::GoToPage(page) => {
                if self.page_count == 0 {
                    return vec![];
                }
                let clamped = page.min(self.page_count - 1);
                self.current_page = clamped;
                vec![Effect::ScrollToPage(clamped), Effect::UpdateStatus]
            }

            Command::Reset { page_count } => {
                self.zoom = 1.0;
                self.rotation = Rotation::Deg0;
                self.current_page = 0;
                self.page_count = page_count;
                vec![
                    Effect::Relayout,
                    Effect::ScrollToPage(0),
                    Effect::UpdateStatus,
                ]
            }
        }
    }

    fn set_zoom(&mut self, zoom: f32) -> Vec<Effect> {
        let clamped = Self::clamp_zoom(zoom);
        if (self.zoom - clamped).abs() > f32::EPSILON {
            self.zoom = clamped;
            vec![Effect::Relayout, Effect::UpdateStatus]
        } else {
            vec![]
        }
    }

    /// Clamp zoom to the valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_zoom(zoom: f32) -> f32 {
        if zoom.is_finite() {
            zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM)
        } else {
            1.0
        }
    }

    /// Zoom as a whole percentage for display
    #[must_use]
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }
}

/// Commands that modify view state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Multiply zoom by one step
    ZoomIn,
    /// Divide zoom by one step
    ZoomOut,
    /// Set the zoom factor (clamped)
    SetZoom(f32),
    /// Rotate a quarter turn clockwise
    Rotate,
    /// Switch fit-to-width on or off
    SetFitToWidth(bool),
    /// Jump to a page (clamped)
    GoToPage(usize),
    /// Start over for a freshly loaded document
    Reset { page_count: usize },
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Scale or rotation changed: invalidate rasters and lay pages out again
    Relayout,
    /// Scroll so the page's top edge is at the top of the viewport
    ScrollToPage(usize),
    /// Push a fresh status line to the host
    UpdateStatus,
}
