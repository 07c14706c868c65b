//! In-memory viewport host
//!
//! Records every drawing command instead of putting pixels on a screen. The CLI
//! drives a session through it and writes the rendered slots out as PNG files;
//! tests use it to observe what the viewer asked the UI to do.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageResult;
use log::debug;

use crate::geometry::CanvasRect;
use crate::host::{SlotImage, Status, ViewportHost};

/// A page's display slot as last commanded
#[derive(Clone, Debug)]
pub struct HeadlessSlot {
    pub rect: CanvasRect,
    pub image: SlotImage,
}

#[derive(Debug, Default)]
pub struct HeadlessHost {
    scroll_region: (u32, u32),
    scroll_y: u32,
    slots: BTreeMap<usize, HeadlessSlot>,
    highlights: Vec<CanvasRect>,
    status: Status,
    status_updates: usize,
    errors: Vec<String>,
}

impl HeadlessHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scroll_region(&self) -> (u32, u32) {
        self.scroll_region
    }

    #[must_use]
    pub fn scroll_y(&self) -> u32 {
        self.scroll_y
    }

    #[must_use]
    pub fn slots(&self) -> &BTreeMap<usize, HeadlessSlot> {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, page: usize) -> Option<&HeadlessSlot> {
        self.slots.get(&page)
    }

    /// Pages whose slot currently shows a raster
    #[must_use]
    pub fn rendered_pages(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|(_, slot)| !slot.image.is_placeholder())
            .map(|(page, _)| *page)
            .collect()
    }

    #[must_use]
    pub fn highlights(&self) -> &[CanvasRect] {
        &self.highlights
    }

    /// Last status pushed by the viewer
    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    #[must_use]
    pub fn status_updates(&self) -> usize {
        self.status_updates
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Write the rasters shown for `pages` as `page-NNNN.png` (1-based) into
    /// `dir`, creating it if needed. Pages showing a placeholder are skipped.
    pub fn save_rasters(
        &self,
        dir: &Path,
        pages: impl IntoIterator<Item = usize>,
    ) -> ImageResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for page in pages {
            let Some(HeadlessSlot {
                image: SlotImage::Raster(image),
                ..
            }) = self.slots.get(&page)
            else {
                continue;
            };
            let path = dir.join(format!("page-{:04}.png", page + 1));
            image.save(&path)?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

impl ViewportHost for HeadlessHost {
    fn set_scroll_region(&mut self, width: u32, height: u32) {
        self.scroll_region = (width, height);
    }

    fn place_slot(&mut self, page: usize, rect: CanvasRect) {
        self.slots
            .entry(page)
            .and_modify(|slot| slot.rect = rect)
            .or_insert(HeadlessSlot {
                rect,
                image: SlotImage::Placeholder,
            });
    }

    fn set_slot_image(&mut self, page: usize, image: SlotImage) {
        match self.slots.get_mut(&page) {
            Some(slot) => slot.image = image,
            None => {
                self.slots.insert(
                    page,
                    HeadlessSlot {
                        rect: CanvasRect::new(0.0, 0.0, 0.0, 0.0),
                        image,
                    },
                );
            }
        }
    }

    fn clear_slots(&mut self) {
        self.slots.clear();
    }

    fn scroll_to(&mut self, y: u32) {
        self.scroll_y = y;
    }

    fn draw_highlight(&mut self, rect: CanvasRect) {
        self.highlights.push(rect);
    }

    fn clear_highlights(&mut self) {
        self.highlights.clear();
    }

    fn update_status(&mut self, status: &Status) {
        self.status = status.clone();
        self.status_updates += 1;
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn slots_keep_their_image_when_moved() {
        let mut host = HeadlessHost::new();
        host.place_slot(0, CanvasRect::new(0.0, 10.0, 100.0, 100.0));
        host.set_slot_image(0, SlotImage::Raster(Arc::new(RgbImage::new(1, 1))));
        host.place_slot(0, CanvasRect::new(0.0, 20.0, 100.0, 100.0));

        let slot = host.slot(0).unwrap();
        assert_eq!(slot.rect.y, 20.0);
        assert_eq!(host.rendered_pages(), vec![0]);
    }

    #[test]
    fn save_rasters_skips_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = HeadlessHost::new();
        host.place_slot(0, CanvasRect::new(0.0, 10.0, 4.0, 4.0));
        host.place_slot(1, CanvasRect::new(0.0, 34.0, 4.0, 4.0));
        host.set_slot_image(
            1,
            SlotImage::Raster(Arc::new(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])))),
        );

        let written = host.save_rasters(&dir.path().join("out"), [0, 1]).unwrap();

        assert_eq!(written, vec![dir.path().join("out").join("page-0002.png")]);
        let reloaded = image::open(&written[0]).unwrap().to_rgb8();
        assert_eq!(reloaded.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn records_status_and_errors() {
        let mut host = HeadlessHost::new();
        host.update_status(&Status::no_document());
        host.show_error("cannot open");

        assert_eq!(host.status_updates(), 1);
        assert_eq!(host.errors(), ["cannot open".to_string()]);
    }
}
