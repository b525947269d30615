//! Masked-bitmap to alpha-cursor conversion.

use crate::engine::PointerBitmap;
use crate::error::RdviewError;

// ── PixelConverter ───────────────────────────────────────────────

/// The engine's pixel-format conversion, used to decode the XOR color
/// plane. Only the AND-mask-to-alpha step is owned here.
pub trait PixelConverter: Send + Sync {
    /// Decode the XOR plane of `bitmap` into tightly packed RGBA rows
    /// (`width * height * 4` bytes).
    fn pointer_to_rgba(&self, bitmap: &PointerBitmap) -> Result<Vec<u8>, RdviewError>;
}

// ── CursorImage ──────────────────────────────────────────────────

/// A converted, renderable cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    /// RGBA pixels, alpha filled in from the AND mask.
    pub rgba: Vec<u8>,
    /// Packed 1-bit transparency mask, rows padded to whole bytes.
    /// A set bit marks an opaque pixel.
    pub mask: Vec<u8>,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
}

impl CursorImage {
    /// Bytes per mask row.
    pub fn mask_stride(&self) -> usize {
        (self.width as usize + 7) / 8
    }

    /// Whether the mask marks `(x, y)` opaque.
    pub fn mask_bit(&self, x: u32, y: u32) -> bool {
        let byte = self.mask[y as usize * self.mask_stride() + x as usize / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    /// Alpha byte of the pixel at `(x, y)`.
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.rgba[(y as usize * self.width as usize + x as usize) * 4 + 3]
    }
}

// ── Conversion ───────────────────────────────────────────────────

/// Read one bit out of a 1-bpp bitmap with byte-padded rows.
fn mask_bit(data: &[u8], x: u32, y: u32, width: u32) -> bool {
    let stride = (width as usize + 7) / 8;
    let index = y as usize * stride + x as usize / 8;
    data[index] & (0x80 >> (x % 8)) != 0
}

/// Convert a protocol pointer bitmap into a renderable cursor.
///
/// The AND mask is read bottom-up (`height - 1 - y`) for every XOR
/// depth except 1 bpp, where rows arrive in top-down order already —
/// the protocol's documented cursor row-ordering quirk. A set AND bit
/// makes the output pixel opaque.
///
/// On any failure nothing is produced; the caller keeps the previous
/// cursor.
pub fn convert_pointer(
    bitmap: &PointerBitmap,
    pixels: &dyn PixelConverter,
) -> Result<CursorImage, RdviewError> {
    let (width, height) = (bitmap.width, bitmap.height);
    if width == 0 || height == 0 {
        return Err(RdviewError::CursorConversion("pointer has no area"));
    }

    let mut rgba = pixels.pointer_to_rgba(bitmap)?;
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(RdviewError::CursorConversion(
            "pixel converter returned a wrong-sized image",
        ));
    }

    let mask_stride = (width as usize + 7) / 8;
    let mut mask = vec![0u8; mask_stride * height as usize];

    if bitmap.and_data.is_empty() {
        // No transparency mask delivered: the cursor is fully opaque.
        for row in mask.chunks_mut(mask_stride) {
            row.fill(0xFF);
        }
        for px in rgba.chunks_mut(4) {
            px[3] = 0xFF;
        }
    } else {
        if bitmap.and_data.len() < mask.len() {
            return Err(RdviewError::CursorConversion("AND mask too short"));
        }
        for y in 0..height {
            let src_row = if bitmap.xor_bpp == 1 { y } else { height - 1 - y };
            for x in 0..width {
                let opaque = mask_bit(&bitmap.and_data, x, src_row, width);
                let px = (y as usize * width as usize + x as usize) * 4;
                if opaque {
                    mask[y as usize * mask_stride + x as usize / 8] |= 0x80 >> (x % 8);
                    rgba[px + 3] = 0xFF;
                } else {
                    rgba[px + 3] = 0;
                }
            }
        }
    }

    Ok(CursorImage {
        width,
        height,
        rgba,
        mask,
        hotspot_x: bitmap.hotspot_x,
        hotspot_y: bitmap.hotspot_y,
    })
}
