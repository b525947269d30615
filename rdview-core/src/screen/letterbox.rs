//! Letterbox stage — centers the scaled image inside the surface.

use crate::screen::{Point, Size};

/// Fill color for the padded region (opaque black).
pub const BACKGROUND_BGRA: [u8; 4] = [0, 0, 0, 0xFF];

// ── LetterboxedView ──────────────────────────────────────────────

/// A derived, read-only description of the scaled image centered in a
/// surface of arbitrary aspect ratio, padded on the shorter axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxedView {
    content: Size,
    surface: Size,
    offset: Point,
}

impl LetterboxedView {
    /// Center `content` inside `surface`.
    pub fn compute(content: Size, surface: Size) -> Self {
        let dx = (surface.width as i64 - content.width as i64) / 2;
        let dy = (surface.height as i64 - content.height as i64) / 2;
        Self {
            content,
            surface,
            offset: Point::new(dx.max(0) as i32, dy.max(0) as i32),
        }
    }

    /// Top-left corner of the content within the surface.
    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn content_size(&self) -> Size {
        self.content
    }

    pub fn surface_size(&self) -> Size {
        self.surface
    }

    /// Map a surface point into content coordinates.
    ///
    /// Points inside the padding clamp to the nearest content edge;
    /// the result is always in bounds. Padding clicks are legal and
    /// simply land on the border pixel.
    pub fn map_to_source(&self, p: Point) -> Point {
        if self.content.is_empty() {
            return Point::default();
        }
        let x = (p.x - self.offset.x).clamp(0, self.content.width as i32 - 1);
        let y = (p.y - self.offset.y).clamp(0, self.content.height as i32 - 1);
        Point::new(x, y)
    }

    /// Forward transform of a content point into surface coordinates.
    pub fn map_from_source(&self, p: Point) -> Point {
        Point::new(p.x + self.offset.x, p.y + self.offset.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_aspect_has_zero_padding() {
        let view = LetterboxedView::compute(Size::new(800, 600), Size::new(800, 600));
        assert_eq!(view.offset(), Point::new(0, 0));
    }

    #[test]
    fn vertical_padding_centers() {
        let view = LetterboxedView::compute(Size::new(800, 450), Size::new(800, 600));
        assert_eq!(view.offset(), Point::new(0, 75));
    }

    #[test]
    fn horizontal_padding_centers() {
        let view = LetterboxedView::compute(Size::new(600, 600), Size::new(800, 600));
        assert_eq!(view.offset(), Point::new(100, 0));
    }

    #[test]
    fn recompute_is_idempotent() {
        let a = LetterboxedView::compute(Size::new(640, 480), Size::new(1000, 500));
        let b = LetterboxedView::compute(Size::new(640, 480), Size::new(1000, 500));
        assert_eq!(a, b);
    }

    #[test]
    fn padding_points_clamp_to_edge() {
        let view = LetterboxedView::compute(Size::new(600, 600), Size::new(800, 600));
        // Left padding → x clamps to 0.
        assert_eq!(view.map_to_source(Point::new(5, 300)), Point::new(0, 300));
        // Right padding → x clamps to the last content pixel.
        assert_eq!(view.map_to_source(Point::new(795, 300)), Point::new(599, 300));
    }

    #[test]
    fn round_trip_inside_content() {
        let view = LetterboxedView::compute(Size::new(600, 600), Size::new(800, 600));
        let p = Point::new(320, 200);
        assert_eq!(view.map_from_source(view.map_to_source(p)), p);
    }
}
