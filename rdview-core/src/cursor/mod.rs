//! Remote cursor handling.
//!
//! The protocol pushes the currently shown cursor over the wire as an
//! XOR color plane plus a 1-bit AND transparency mask. [`convert`]
//! turns that into a renderable RGBA image and mask; [`PointerCache`]
//! stores converted cursors under opaque handles until the engine
//! releases them.

pub mod cache;
pub mod convert;

pub use cache::{PointerCache, PointerHandle};
pub use convert::{CursorImage, PixelConverter, convert_pointer};
