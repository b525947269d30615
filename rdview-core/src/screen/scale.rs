//! Aspect-preserving scale stage.

use crate::screen::{Point, Size};

/// Largest factor the scaler will ever enlarge the desktop by.
/// Shrinking is unbounded; aspect ratio is never distorted.
pub const MAX_UPSCALE: f64 = 2.0;

// ── ScaledView ───────────────────────────────────────────────────

/// A derived, read-only description of the desktop scaled to fit a
/// surface.
///
/// Pure value type: recomputing with identical inputs yields an
/// identical view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledView {
    source: Size,
    scaled: Size,
    factor: f64,
}

impl ScaledView {
    /// Compute the scale that fits `source` inside `surface`.
    pub fn compute(source: Size, surface: Size) -> Self {
        Self::compute_with_max(source, surface, MAX_UPSCALE)
    }

    /// Compute with an explicit upscale cap.
    pub fn compute_with_max(source: Size, surface: Size, max_upscale: f64) -> Self {
        if source.is_empty() || surface.is_empty() {
            return Self {
                source,
                scaled: Size::default(),
                factor: 0.0,
            };
        }

        let fx = surface.width as f64 / source.width as f64;
        let fy = surface.height as f64 / source.height as f64;
        let factor = fx.min(fy).min(max_upscale);

        let scaled = Size::new(
            (source.width as f64 * factor).round() as u32,
            (source.height as f64 * factor).round() as u32,
        );

        Self {
            source,
            scaled,
            factor,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn source_size(&self) -> Size {
        self.source
    }

    pub fn scaled_size(&self) -> Size {
        self.scaled
    }

    /// Map a point in scaled coordinates back to the source pixel,
    /// clamped to the source bounds.
    pub fn map_to_source(&self, p: Point) -> Point {
        if self.factor <= 0.0 || self.source.is_empty() {
            return Point::default();
        }
        let x = (p.x.max(0) as f64 / self.factor) as i64;
        let y = (p.y.max(0) as f64 / self.factor) as i64;
        Point::new(
            x.min(self.source.width as i64 - 1) as i32,
            y.min(self.source.height as i64 - 1) as i32,
        )
    }

    /// Forward transform of a source pixel into scaled coordinates.
    pub fn map_from_source(&self, p: Point) -> Point {
        Point::new(
            (p.x.max(0) as f64 * self.factor) as i32,
            (p.y.max(0) as f64 * self.factor) as i32,
        )
    }
}
