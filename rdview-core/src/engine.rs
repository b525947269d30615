//! Protocol-engine boundary.
//!
//! The wire-level protocol (transport, crypto, codecs, pixel-format
//! conversion) lives behind these traits. The session controller only
//! ever talks to the engine through them, and the engine reports back
//! by invoking the controller's callback methods on its processing
//! thread — context is always passed explicitly, never recovered by
//! reinterpreting an engine-owned struct.

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::RdviewError;
use crate::screen::{PixelFormat, Rect};

// ── DesktopGeometry ──────────────────────────────────────────────

/// Desktop geometry and color depth, final once the engine reports
/// post-connect readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopGeometry {
    pub width: u32,
    pub height: u32,
    pub color_depth: u8,
}

impl DesktopGeometry {
    pub fn pixel_format(&self) -> Result<PixelFormat, RdviewError> {
        PixelFormat::from_color_depth(self.color_depth)
    }
}

// ── Callback payloads ────────────────────────────────────────────

/// One decoded-or-compressed rectangle within a bitmap update batch.
#[derive(Debug, Clone)]
pub struct RectangleUpdate {
    /// Destination left edge in desktop coordinates.
    pub x: u32,
    /// Destination top edge in desktop coordinates.
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    /// When set, `data` is codec-compressed and must go through the
    /// [`BitmapCodec`] before being applied.
    pub compressed: bool,
    pub data: Bytes,
}

impl RectangleUpdate {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// A pointer bitmap as delivered by the engine's cursor callback.
#[derive(Debug, Clone)]
pub struct PointerBitmap {
    pub width: u32,
    pub height: u32,
    /// Bit depth of the XOR color plane (1/8/15/16/24/32).
    pub xor_bpp: u8,
    /// XOR color plane.
    pub xor_data: Bytes,
    /// 1-bit-per-pixel AND transparency mask, rows padded to bytes.
    pub and_data: Bytes,
    pub hotspot_x: u16,
    pub hotspot_y: u16,
}

// ── EngineSettings ───────────────────────────────────────────────

/// Settings applied to the engine before connecting.
#[derive(Clone)]
pub struct EngineSettings {
    pub host: String,
    pub port: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub color_depth: u8,
    pub username: String,
    pub password: String,
    /// Static virtual channels to open (the clipboard channel when
    /// clipboard sync is enabled).
    pub static_channels: Vec<String>,
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("desktop_width", &self.desktop_width)
            .field("desktop_height", &self.desktop_height)
            .field("color_depth", &self.color_depth)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("static_channels", &self.static_channels)
            .finish()
    }
}

// ── OrderSupport ─────────────────────────────────────────────────

/// Index constants for the drawing-order capability table.
///
/// Positions follow the protocol's negotiation order numbering; the
/// table itself is 32 entries with the unused slots left false.
pub mod order_index {
    pub const DSTBLT: usize = 0x00;
    pub const PATBLT: usize = 0x01;
    pub const SCRBLT: usize = 0x02;
    pub const MEMBLT: usize = 0x03;
    pub const MEM3BLT: usize = 0x04;
    pub const DRAWNINEGRID: usize = 0x07;
    pub const LINETO: usize = 0x08;
    pub const MULTI_DRAWNINEGRID: usize = 0x09;
    pub const OPAQUE_RECT: usize = 0x0A;
    pub const SAVEBITMAP: usize = 0x0B;
    pub const MEMBLT_V2: usize = 0x0D;
    pub const MEM3BLT_V2: usize = 0x0E;
    pub const MULTIDSTBLT: usize = 0x0F;
    pub const MULTIPATBLT: usize = 0x10;
    pub const MULTISCRBLT: usize = 0x11;
    pub const MULTIOPAQUERECT: usize = 0x12;
    pub const FAST_INDEX: usize = 0x13;
    pub const POLYGON_SC: usize = 0x14;
    pub const POLYGON_CB: usize = 0x15;
    pub const POLYLINE: usize = 0x16;
    pub const FAST_GLYPH: usize = 0x18;
    pub const ELLIPSE_SC: usize = 0x19;
    pub const ELLIPSE_CB: usize = 0x1A;
    pub const GLYPH_INDEX: usize = 0x1B;
}

/// Number of slots in the drawing-order capability table.
pub const ORDER_TABLE_LEN: usize = 32;

/// Supported drawing orders advertised during negotiation.
///
/// The two MEMBLT entries follow the bitmap-cache flag; everything
/// else is a fixed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSupport {
    pub dst_blt: bool,
    pub pat_blt: bool,
    pub scr_blt: bool,
    pub opaque_rect: bool,
    pub draw_nine_grid: bool,
    pub multi_dst_blt: bool,
    pub multi_pat_blt: bool,
    pub multi_scr_blt: bool,
    pub multi_opaque_rect: bool,
    pub multi_draw_nine_grid: bool,
    pub line_to: bool,
    pub polyline: bool,
    pub mem_blt: bool,
    pub mem3_blt: bool,
    pub mem_blt_v2: bool,
    pub mem3_blt_v2: bool,
    pub save_bitmap: bool,
    pub glyph_index: bool,
    pub fast_index: bool,
    pub fast_glyph: bool,
    pub polygon_sc: bool,
    pub polygon_cb: bool,
    pub ellipse_sc: bool,
    pub ellipse_cb: bool,
}

impl Default for OrderSupport {
    fn default() -> Self {
        Self::with_bitmap_cache(true)
    }
}

impl OrderSupport {
    /// The advertised order set, with MEMBLT/MEMBLT_V2 tied to
    /// whether the bitmap cache is in use.
    pub fn with_bitmap_cache(bitmap_cache: bool) -> Self {
        Self {
            dst_blt: true,
            pat_blt: true,
            scr_blt: true,
            opaque_rect: true,
            draw_nine_grid: false,
            multi_dst_blt: false,
            multi_pat_blt: false,
            multi_scr_blt: false,
            multi_opaque_rect: true,
            multi_draw_nine_grid: false,
            line_to: true,
            polyline: true,
            mem_blt: bitmap_cache,
            mem3_blt: true,
            mem_blt_v2: bitmap_cache,
            mem3_blt_v2: false,
            save_bitmap: false,
            glyph_index: true,
            fast_index: true,
            fast_glyph: true,
            polygon_sc: false,
            polygon_cb: false,
            ellipse_sc: false,
            ellipse_cb: false,
        }
    }

    /// The ordered boolean table handed to the engine.
    pub fn as_table(&self) -> [bool; ORDER_TABLE_LEN] {
        use order_index::*;
        let mut table = [false; ORDER_TABLE_LEN];
        table[DSTBLT] = self.dst_blt;
        table[PATBLT] = self.pat_blt;
        table[SCRBLT] = self.scr_blt;
        table[MEMBLT] = self.mem_blt;
        table[MEM3BLT] = self.mem3_blt;
        table[DRAWNINEGRID] = self.draw_nine_grid;
        table[LINETO] = self.line_to;
        table[MULTI_DRAWNINEGRID] = self.multi_draw_nine_grid;
        table[OPAQUE_RECT] = self.opaque_rect;
        table[SAVEBITMAP] = self.save_bitmap;
        table[MEMBLT_V2] = self.mem_blt_v2;
        table[MEM3BLT_V2] = self.mem3_blt_v2;
        table[MULTIDSTBLT] = self.multi_dst_blt;
        table[MULTIPATBLT] = self.multi_pat_blt;
        table[MULTISCRBLT] = self.multi_scr_blt;
        table[MULTIOPAQUERECT] = self.multi_opaque_rect;
        table[FAST_INDEX] = self.fast_index;
        table[POLYGON_SC] = self.polygon_sc;
        table[POLYGON_CB] = self.polygon_cb;
        table[POLYLINE] = self.polyline;
        table[FAST_GLYPH] = self.fast_glyph;
        table[ELLIPSE_SC] = self.ellipse_sc;
        table[ELLIPSE_CB] = self.ellipse_cb;
        table[GLYPH_INDEX] = self.glyph_index;
        table
    }
}

/// Everything registered with the engine at pre-connect readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationCapabilities {
    pub orders: OrderSupport,
    pub bitmap_cache: bool,
    /// Frames acknowledged ahead of rendering.
    pub frame_acknowledge: u32,
}

impl NegotiationCapabilities {
    pub fn new(bitmap_cache: bool) -> Self {
        Self {
            orders: OrderSupport::with_bitmap_cache(bitmap_cache),
            bitmap_cache,
            frame_acknowledge: 10,
        }
    }
}

impl Default for NegotiationCapabilities {
    fn default() -> Self {
        Self::new(true)
    }
}

// ── Boundary traits ──────────────────────────────────────────────

/// The protocol engine as seen from the session controller.
///
/// All methods are synchronous: the controller calls them either from
/// the presentation boundary or from inside an engine callback on the
/// processing thread, and the engine is expected to queue rather than
/// block.
pub trait ProtocolEngine: Send + Sync {
    /// One-time process-global library setup. Ran by [`LibraryGuard`]
    /// when the first guard is acquired.
    fn global_init(&self) -> Result<(), RdviewError> {
        Ok(())
    }

    /// Process-global teardown, ran when the last guard drops.
    fn global_teardown(&self) {}

    /// Apply connect settings. Called once per session, before any
    /// network activity.
    fn apply_settings(&self, settings: &EngineSettings) -> Result<(), RdviewError>;

    /// Register negotiation capabilities at pre-connect readiness.
    fn register_capabilities(&self, caps: &NegotiationCapabilities) -> Result<(), RdviewError>;

    /// Final desktop geometry. Only meaningful once the engine has
    /// reported post-connect readiness.
    fn desktop_geometry(&self) -> DesktopGeometry;

    /// Inject a pointer event at desktop coordinates.
    fn send_pointer(
        &self,
        flags: crate::input::PointerFlags,
        x: u16,
        y: u16,
    ) -> Result<(), RdviewError>;

    /// Inject a keyboard scancode event.
    fn send_scancode(
        &self,
        scancode: u16,
        flags: crate::input::KeyboardFlags,
    ) -> Result<(), RdviewError>;

    /// Inject the keyboard-pause sequence (stops remote auto-repeat).
    fn send_keyboard_pause(&self) -> Result<(), RdviewError>;

    /// Send raw bytes over a named static virtual channel.
    fn send_channel_data(&self, channel: &str, data: Bytes) -> Result<(), RdviewError>;

    /// Interrupt the blocking receive loop; the engine must follow up
    /// with its disconnected callback.
    fn request_stop(&self);
}

/// Decompressor for codec-compressed rectangle payloads.
pub trait BitmapCodec: Send + Sync {
    /// Decode `update.data` into tightly packed rows at the
    /// rectangle's bit depth.
    fn decompress(&self, update: &RectangleUpdate) -> Result<Bytes, RdviewError>;
}

// ── LibraryGuard ─────────────────────────────────────────────────

static LIBRARY_REFS: Mutex<u32> = Mutex::new(0);

/// Reference-counted handle for process-global engine library state.
///
/// The first acquire runs [`ProtocolEngine::global_init`]; dropping
/// the last guard runs [`ProtocolEngine::global_teardown`]. Acquire a
/// guard before creating any session and keep it alive as long as the
/// session may touch the engine.
pub struct LibraryGuard {
    engine: Arc<dyn ProtocolEngine>,
}

impl LibraryGuard {
    pub fn acquire(engine: Arc<dyn ProtocolEngine>) -> Result<Self, RdviewError> {
        let mut refs = LIBRARY_REFS.lock().unwrap();
        if *refs == 0 {
            engine.global_init()?;
        }
        *refs += 1;
        Ok(Self { engine })
    }
}

impl Drop for LibraryGuard {
    fn drop(&mut self) {
        let mut refs = LIBRARY_REFS.lock().unwrap();
        *refs -= 1;
        if *refs == 0 {
            self.engine.global_teardown();
        }
    }
}
