//! Clipboard channel support.
//!
//! [`pdu`] owns the exact wire encoding of the clipboard channel's
//! messages; [`bridge`] is the state machine that speaks them,
//! arbitrating between the remote side and the local clipboard.

pub mod bridge;
pub mod pdu;

pub use bridge::{CLIPBOARD_CHANNEL_NAME, ClipboardBridge, ClipboardChannel, LocalClipboard};
pub use pdu::{
    CF_TEXT, CF_UNICODETEXT, ClipboardPdu, FormatEntry, GeneralFlags, MessageFlags, decode_text,
    encode_text,
};
