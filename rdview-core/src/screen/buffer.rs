//! Canonical desktop-sized pixel buffer.
//!
//! Receives decoded rectangle updates from the processing thread and
//! is read by the presentation thread during repaint. Size and format
//! are fixed at the negotiated desktop geometry for the lifetime of
//! the session.

use std::sync::RwLock;

use crate::error::RdviewError;
use crate::screen::{PixelFormat, Rect, Size};

// ── RemoteScreenBuffer ───────────────────────────────────────────

/// The canonical decoded pixel surface for one session.
///
/// Writes are whole-rectangle replacements performed by the protocol
/// processing thread; reads take a shared lock for the duration of a
/// repaint composition, so a repaint never observes a half-written
/// rectangle.
pub struct RemoteScreenBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: RwLock<Vec<u8>>,
}

impl RemoteScreenBuffer {
    /// Allocate a zeroed buffer at the negotiated desktop geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: RwLock::new(vec![0u8; len]),
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Total byte size of the pixel store.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Blit one decoded rectangle into the buffer.
    ///
    /// `data` holds `rect.height` tightly packed rows of
    /// `rect.width * bytes_per_pixel` bytes.
    pub fn apply_rectangle(&self, rect: Rect, data: &[u8]) -> Result<(), RdviewError> {
        let bpp = self.format.bytes_per_pixel();

        let right = rect.x.checked_add(rect.width);
        let bottom = rect.y.checked_add(rect.height);
        let in_bounds = matches!((right, bottom), (Some(r), Some(b)) if r <= self.width && b <= self.height);
        if !in_bounds || rect.width == 0 || rect.height == 0 {
            return Err(RdviewError::RectangleOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                buffer_width: self.width,
                buffer_height: self.height,
            });
        }

        let row_len = rect.width as usize * bpp;
        let needed = row_len * rect.height as usize;
        if data.len() < needed {
            return Err(RdviewError::BitmapDecode(format!(
                "rectangle payload too short: {} < {}",
                data.len(),
                needed
            )));
        }

        let stride = self.width as usize * bpp;
        let mut pixels = self.pixels.write().unwrap();
        for row in 0..rect.height as usize {
            let dst = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            let src = row * row_len;
            pixels[dst..dst + row_len].copy_from_slice(&data[src..src + row_len]);
        }
        Ok(())
    }

    /// Run `f` over the pixel store under the read lock.
    ///
    /// Used by the repaint composition to avoid cloning the whole
    /// buffer per frame.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let pixels = self.pixels.read().unwrap();
        f(&pixels)
    }

    /// Copy of the full pixel store.
    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_exact_byte_size() {
        let buf = RemoteScreenBuffer::new(1024, 768, PixelFormat::Bgrx8);
        assert_eq!(buf.byte_len(), 1024 * 768 * 4);
        assert_eq!(buf.snapshot().len(), 1024 * 768 * 4);
    }

    #[test]
    fn apply_rectangle_blits_rows() {
        let buf = RemoteScreenBuffer::new(4, 4, PixelFormat::Bgrx8);
        let data = vec![0xAB; 2 * 2 * 4];
        buf.apply_rectangle(Rect::new(1, 1, 2, 2), &data).unwrap();

        let pixels = buf.snapshot();
        let stride = 4 * 4;
        // inside
        assert_eq!(pixels[stride + 4], 0xAB);
        assert_eq!(pixels[2 * stride + 2 * 4 + 3], 0xAB);
        // outside stays zero
        assert_eq!(pixels[0], 0);
        assert_eq!(pixels[3 * stride + 3 * 4], 0);
    }

    #[test]
    fn rejects_out_of_bounds_rectangle() {
        let buf = RemoteScreenBuffer::new(4, 4, PixelFormat::Bgrx8);
        let err = buf
            .apply_rectangle(Rect::new(3, 0, 2, 1), &[0u8; 8])
            .unwrap_err();
        assert!(matches!(err, RdviewError::RectangleOutOfBounds { .. }));
    }

    #[test]
    fn rejects_short_payload() {
        let buf = RemoteScreenBuffer::new(4, 4, PixelFormat::Bgrx8);
        let err = buf
            .apply_rectangle(Rect::new(0, 0, 2, 2), &[0u8; 4])
            .unwrap_err();
        assert!(matches!(err, RdviewError::BitmapDecode(_)));
    }

    #[test]
    fn full_frame_rectangle_replaces_everything() {
        let buf = RemoteScreenBuffer::new(2, 2, PixelFormat::Rgb565);
        let data = vec![0x55; 2 * 2 * 2];
        buf.apply_rectangle(Rect::new(0, 0, 2, 2), &data).unwrap();
        assert!(buf.snapshot().iter().all(|&b| b == 0x55));
    }
}
