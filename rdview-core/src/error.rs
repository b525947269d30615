//! Domain-specific error types for the session bridge.
//!
//! All fallible operations return `Result<T, RdviewError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the session bridge.
#[derive(Debug, Error)]
pub enum RdviewError {
    // ── Configuration Errors ─────────────────────────────────────
    /// Connect parameters were invalid; rejected before any engine
    /// activity.
    #[error("invalid configuration: {0}")]
    Configuration(&'static str),

    // ── Session Errors ───────────────────────────────────────────
    /// Negotiation or transport failure. Terminal for the session.
    #[error("connection failed: {0}")]
    Connection(String),

    /// An operation was attempted in a lifecycle state that does not
    /// permit it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Screen Errors ────────────────────────────────────────────
    /// A rectangle update does not fit inside the desktop buffer.
    #[error(
        "rectangle out of bounds: {x},{y} {width}x{height} for buffer {buffer_width}x{buffer_height}"
    )]
    RectangleOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        buffer_width: u32,
        buffer_height: u32,
    },

    /// Decoding of a single bitmap rectangle failed. The rectangle is
    /// skipped; the session continues.
    #[error("bitmap decode failed: {0}")]
    BitmapDecode(String),

    /// The negotiated color depth has no pixel-format mapping.
    #[error("unsupported color depth: {0} bpp")]
    UnsupportedColorDepth(u8),

    // ── Cursor Errors ────────────────────────────────────────────
    /// A pointer bitmap could not be converted. The cursor update is
    /// dropped; the previous cursor stays in effect.
    #[error("cursor conversion failed: {0}")]
    CursorConversion(&'static str),

    // ── Clipboard Errors ─────────────────────────────────────────
    /// The clipboard channel handshake failed. The channel is treated
    /// as unavailable; the display session continues.
    #[error("clipboard channel error: {0}")]
    Channel(&'static str),

    /// A clipboard message could not be parsed.
    #[error("invalid clipboard message: {0}")]
    InvalidPdu(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Infrastructure Errors ────────────────────────────────────
    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RdviewError {
    fn from(s: String) -> Self {
        RdviewError::Other(s)
    }
}

impl From<&str> for RdviewError {
    fn from(s: &str) -> Self {
        RdviewError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RdviewError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RdviewError::ChannelClosed
    }
}
