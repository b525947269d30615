//! # rdview-core
//!
//! Remote desktop session bridge: sits between a network-facing
//! remote desktop protocol engine and a presentation surface,
//! translating the protocol's push-based update stream into
//! renderable state and local input back into protocol requests.
//!
//! This crate contains:
//! - **Session**: `SessionController` lifecycle orchestration,
//!   `SessionPhase` state machine, `SessionEvent` notifications
//! - **Screen**: `RemoteScreenBuffer` → `ScaledView` →
//!   `LetterboxedView` pipeline with invertible point mapping
//! - **Cursor**: XOR/AND masked-bitmap conversion and `PointerCache`
//! - **Clipboard**: cliprdr wire codec and the `ClipboardBridge`
//!   synchronization state machine
//! - **Engine**: the boundary traits a protocol engine plugs into
//! - **Input**: pointer/keyboard wire flags and modifier bookkeeping
//! - **Error**: `RdviewError` — typed, `thiserror`-based hierarchy
//!
//! The wire protocol itself (transport, crypto, bitmap codecs) and
//! the UI toolkit are collaborators behind the [`engine`] traits and
//! the [`session::SessionEvent`] queue; this crate is the engine room
//! both of them plug into.

pub mod clipboard;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod input;
pub mod screen;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use clipboard::{CLIPBOARD_CHANNEL_NAME, ClipboardBridge, ClipboardChannel, ClipboardPdu,
    FormatEntry, LocalClipboard};
pub use config::SessionConfig;
pub use cursor::{CursorImage, PixelConverter, PointerCache, PointerHandle};
pub use engine::{
    BitmapCodec, DesktopGeometry, EngineSettings, LibraryGuard, NegotiationCapabilities,
    OrderSupport, PointerBitmap, ProtocolEngine, RectangleUpdate,
};
pub use error::RdviewError;
pub use input::{KeyModifier, KeyboardFlags, ModifierTracker, MouseButton, PointerFlags};
pub use screen::{Image, LetterboxedView, Point, Rect, RemoteScreenBuffer, ScaledView,
    ScreenPipeline, Size};
pub use session::{SessionController, SessionEvent, SessionPhase};
