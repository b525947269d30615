//! Pipeline composition — raw buffer, scale, letterbox.

use std::sync::{Arc, RwLock};

use crate::screen::{
    BACKGROUND_BGRA, Image, LetterboxedView, Point, RemoteScreenBuffer, ScaledView, Size,
};

// ── ScreenPipeline ───────────────────────────────────────────────

/// Owns the canonical buffer and the two derived views.
///
/// The views are recomputed on every surface resize (idempotent for
/// unchanged inputs) and read atomically, so a repaint and a resize
/// never observe a scale/offset pair from different surface sizes.
pub struct ScreenPipeline {
    buffer: Arc<RemoteScreenBuffer>,
    views: RwLock<Views>,
}

#[derive(Debug, Clone, Copy)]
struct Views {
    scaled: ScaledView,
    boxed: LetterboxedView,
}

impl Views {
    fn compute(source: Size, surface: Size) -> Self {
        let scaled = ScaledView::compute(source, surface);
        let boxed = LetterboxedView::compute(scaled.scaled_size(), surface);
        Self { scaled, boxed }
    }
}

impl ScreenPipeline {
    pub fn new(buffer: Arc<RemoteScreenBuffer>, surface: Size) -> Self {
        let views = Views::compute(buffer.size(), surface);
        Self {
            buffer,
            views: RwLock::new(views),
        }
    }

    pub fn buffer(&self) -> &Arc<RemoteScreenBuffer> {
        &self.buffer
    }

    /// Recompute both views for a new presentation surface size.
    pub fn resize_surface(&self, surface: Size) {
        let views = Views::compute(self.buffer.size(), surface);
        *self.views.write().unwrap() = views;
    }

    /// The current (scaled, letterboxed) view pair.
    pub fn views(&self) -> (ScaledView, LetterboxedView) {
        let v = self.views.read().unwrap();
        (v.scaled, v.boxed)
    }

    /// Map a surface point to the remote desktop pixel under it.
    ///
    /// Inverse of letterboxing then scaling; always in bounds.
    pub fn map_to_source(&self, p: Point) -> Point {
        let v = *self.views.read().unwrap();
        v.scaled.map_to_source(v.boxed.map_to_source(p))
    }

    /// Forward transform of a desktop pixel into surface coordinates.
    pub fn map_from_source(&self, p: Point) -> Point {
        let v = *self.views.read().unwrap();
        v.boxed.map_from_source(v.scaled.map_from_source(p))
    }

    /// Compose the repaint image: the desktop resampled into the
    /// scaled rectangle, centered over the background fill.
    pub fn snapshot(&self) -> Image {
        let v = *self.views.read().unwrap();
        let surface = v.boxed.surface_size();
        let mut image = Image::filled(surface, BACKGROUND_BGRA);

        let scaled = v.scaled.scaled_size();
        let factor = v.scaled.factor();
        if scaled.is_empty() || factor <= 0.0 {
            return image;
        }

        let source = self.buffer.size();
        let format = self.buffer.format();
        let bpp = format.bytes_per_pixel();
        let src_stride = source.width as usize * bpp;
        let offset = v.boxed.offset();

        self.buffer.read(|pixels| {
            for y in 0..scaled.height {
                let sy = ((y as f64 / factor) as u32).min(source.height - 1);
                let dst_row =
                    ((y + offset.y as u32) as usize * surface.width as usize) * 4;
                for x in 0..scaled.width {
                    let sx = ((x as f64 / factor) as u32).min(source.width - 1);
                    let src = sy as usize * src_stride + sx as usize * bpp;
                    let bgra = format.read_bgra(&pixels[src..src + bpp]);
                    let dst = dst_row + (x + offset.x as u32) as usize * 4;
                    image.data[dst..dst + 4].copy_from_slice(&bgra);
                }
            }
        });

        image
    }
}
