//! Geometry shared by the layout engine, the render worker and search highlighting

use std::fmt;

/// Intrinsic page size in document units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in document space (page units, y grows downwards)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl DocRect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Rectangle in canvas space (pixels, relative to the top of the scroll region)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Page rotation, clockwise, in quarter turns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees (0, 90, 180 or 270)
    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Parse a rotation given in degrees. Any multiple of 90 is accepted,
    /// negative values rotate counter-clockwise.
    #[must_use]
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            _ => Some(Self::Deg270),
        }
    }

    /// Next quarter turn clockwise; four calls return to `Deg0`
    #[must_use]
    pub const fn rotated_cw(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// Whether width and height swap under this rotation
    #[must_use]
    pub const fn is_sideways(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Document-to-raster transform for one page: rotation first, then uniform scale.
///
/// The rotated page is translated so its bounding box starts at the origin,
/// which is where a rasterizer places the top-left pixel of the output image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageTransform {
    pub page: PageSize,
    pub scale: f32,
    pub rotation: Rotation,
}

impl PageTransform {
    #[must_use]
    pub const fn new(page: PageSize, scale: f32, rotation: Rotation) -> Self {
        Self {
            page,
            scale,
            rotation,
        }
    }

    /// Page extent after rotation, before scaling
    #[must_use]
    pub fn rotated_extent(&self) -> (f32, f32) {
        if self.rotation.is_sideways() {
            (self.page.height, self.page.width)
        } else {
            (self.page.width, self.page.height)
        }
    }

    /// Raster size in whole pixels (truncated)
    #[must_use]
    pub fn output_size(&self) -> (u32, u32) {
        let (w, h) = self.rotated_extent();
        (to_pixels(w * self.scale), to_pixels(h * self.scale))
    }

    /// Map a document-space point into raster space
    #[must_use]
    pub fn apply_point(&self, x: f32, y: f32) -> (f32, f32) {
        let PageSize { width, height } = self.page;
        let (rx, ry) = match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (height - y, x),
            Rotation::Deg180 => (width - x, height - y),
            Rotation::Deg270 => (y, width - x),
        };
        (rx * self.scale, ry * self.scale)
    }

    /// Map a document-space rectangle into raster space.
    /// The result is normalized so width and height are non-negative.
    #[must_use]
    pub fn apply_rect(&self, rect: DocRect) -> CanvasRect {
        let (ax, ay) = self.apply_point(rect.x0, rect.y0);
        let (bx, by) = self.apply_point(rect.x1, rect.y1);
        let x = ax.min(bx);
        let y = ay.min(by);
        CanvasRect::new(x, y, (ax - bx).abs(), (ay - by).abs())
    }
}

fn to_pixels(value: f32) -> u32 {
    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}
