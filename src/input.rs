//! Parsing of text typed into the page-jump and zoom boxes

use crate::view_state::ViewState;

/// Rejected text entry. The view is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("not a page number: {0:?}")]
    PageNumber(String),

    #[error("page {page} is outside 1..={count}")]
    PageOutOfRange { page: usize, count: usize },

    #[error("not a zoom level: {0:?}")]
    Zoom(String),

    #[error("zoom {percent}% is outside {min}%..={max}%")]
    ZoomOutOfRange { percent: f32, min: u32, max: u32 },
}

/// Parse a 1-based page number into a 0-based index
pub fn parse_page_entry(text: &str, page_count: usize) -> Result<usize, InputError> {
    let trimmed = text.trim();
    let page: usize = trimmed
        .parse()
        .map_err(|_| InputError::PageNumber(trimmed.to_string()))?;

    if page == 0 || page > page_count {
        return Err(InputError::PageOutOfRange {
            page,
            count: page_count,
        });
    }
    Ok(page - 1)
}

/// Accept a zoom factor only if it lies within the supported range
pub fn check_zoom(factor: f32) -> Result<f32, InputError> {
    if factor.is_finite() && (ViewState::MIN_ZOOM..=ViewState::MAX_ZOOM).contains(&factor) {
        Ok(factor)
    } else {
        Err(out_of_range(factor * 100.0))
    }
}

fn out_of_range(percent: f32) -> InputError {
    InputError::ZoomOutOfRange {
        percent,
        min: (ViewState::MIN_ZOOM * 100.0).round() as u32,
        max: (ViewState::MAX_ZOOM * 100.0).round() as u32,
    }
}

/// Parse `"120%"` or `"120"` into a zoom factor (`1.2`)
pub fn parse_zoom_entry(text: &str) -> Result<f32, InputError> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    let percent: f32 = number
        .parse()
        .ok()
        .filter(|p: &f32| p.is_finite())
        .ok_or_else(|| InputError::Zoom(trimmed.to_string()))?;

    if !(ViewState::MIN_ZOOM * 100.0..=ViewState::MAX_ZOOM * 100.0).contains(&percent) {
        return Err(out_of_range(percent));
    }
    Ok(percent / 100.0)
}
