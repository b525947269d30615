//! Clipboard channel wire messages.
//!
//! # Wire Protocol
//!
//! Every message is an 8-byte little-endian header followed by the
//! body:
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────┬───────────┐
//! │ msg_type u16 │ msg_flags u16 │ data_len u32 │ body ...  │
//! └──────────────┴───────────────┴──────────────┴───────────┘
//! ```
//!
//! ```text
//! Remote ──[MonitorReady]───────────────────► Bridge
//! Bridge ──[Capabilities]───────────────────► Remote
//! Bridge ──[FormatList]─────────────────────► Remote
//!
//! Remote ──[FormatList]─────────────────────► Bridge
//! Bridge ──[FormatListResponse]─────────────► Remote
//! Bridge ──[FormatDataRequest]──────────────► Remote
//! Remote ──[FormatDataResponse]─────────────► Bridge
//! ```
//!
//! Text payloads use CR/LF line endings and a null terminator;
//! Unicode text is UTF-16LE.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RdviewError;

// ── Format ids ───────────────────────────────────────────────────

/// Plain 8-bit text.
pub const CF_TEXT: u32 = 1;
/// UTF-16 text.
pub const CF_UNICODETEXT: u32 = 13;

// ── Message types ────────────────────────────────────────────────

const MSG_MONITOR_READY: u16 = 0x0001;
const MSG_FORMAT_LIST: u16 = 0x0002;
const MSG_FORMAT_LIST_RESPONSE: u16 = 0x0003;
const MSG_FORMAT_DATA_REQUEST: u16 = 0x0004;
const MSG_FORMAT_DATA_RESPONSE: u16 = 0x0005;
const MSG_CLIP_CAPS: u16 = 0x0007;
const MSG_LOCK_CLIPDATA: u16 = 0x000A;
const MSG_UNLOCK_CLIPDATA: u16 = 0x000B;

const HEADER_LEN: usize = 8;

const CAPSTYPE_GENERAL: u16 = 0x0001;
const CAPS_VERSION_2: u32 = 0x0002;
const GENERAL_CAPS_LEN: u16 = 12;

bitflags! {
    /// Header flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MessageFlags: u16 {
        const RESPONSE_OK = 0x0001;
        const RESPONSE_FAIL = 0x0002;
        const ASCII_NAMES = 0x0004;
    }
}

bitflags! {
    /// General capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GeneralFlags: u32 {
        const USE_LONG_FORMAT_NAMES = 0x0000_0002;
        const STREAM_FILECLIP_ENABLED = 0x0000_0004;
        const FILECLIP_NO_FILE_PATHS = 0x0000_0008;
        const CAN_LOCK_CLIPDATA = 0x0000_0010;
    }
}

// ── FormatEntry ──────────────────────────────────────────────────

/// One advertised clipboard format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    pub id: u32,
    /// Long format name; `None` for the well-known formats.
    pub name: Option<String>,
}

impl FormatEntry {
    pub fn new(id: u32) -> Self {
        Self { id, name: None }
    }
}

// ── ClipboardPdu ─────────────────────────────────────────────────

/// A clipboard channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPdu {
    MonitorReady,
    Capabilities { general_flags: GeneralFlags },
    FormatList { formats: Vec<FormatEntry> },
    FormatListResponse { ok: bool },
    FormatDataRequest { format_id: u32 },
    FormatDataResponse { ok: bool, data: Bytes },
    LockClipboardData { clip_data_id: u32 },
    UnlockClipboardData { clip_data_id: u32 },
}

impl ClipboardPdu {
    /// Serialize to the exact wire layout.
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        let mut flags = MessageFlags::empty();

        let msg_type = match self {
            ClipboardPdu::MonitorReady => MSG_MONITOR_READY,
            ClipboardPdu::Capabilities { general_flags } => {
                body.put_u16_le(1); // one capability set
                body.put_u16_le(0); // pad
                body.put_u16_le(CAPSTYPE_GENERAL);
                body.put_u16_le(GENERAL_CAPS_LEN);
                body.put_u32_le(CAPS_VERSION_2);
                body.put_u32_le(general_flags.bits());
                MSG_CLIP_CAPS
            }
            ClipboardPdu::FormatList { formats } => {
                for entry in formats {
                    body.put_u32_le(entry.id);
                    if let Some(name) = &entry.name {
                        for unit in name.encode_utf16() {
                            body.put_u16_le(unit);
                        }
                    }
                    body.put_u16_le(0); // name terminator
                }
                MSG_FORMAT_LIST
            }
            ClipboardPdu::FormatListResponse { ok } => {
                flags = if *ok {
                    MessageFlags::RESPONSE_OK
                } else {
                    MessageFlags::RESPONSE_FAIL
                };
                MSG_FORMAT_LIST_RESPONSE
            }
            ClipboardPdu::FormatDataRequest { format_id } => {
                body.put_u32_le(*format_id);
                MSG_FORMAT_DATA_REQUEST
            }
            ClipboardPdu::FormatDataResponse { ok, data } => {
                flags = if *ok {
                    MessageFlags::RESPONSE_OK
                } else {
                    MessageFlags::RESPONSE_FAIL
                };
                body.put_slice(data);
                MSG_FORMAT_DATA_RESPONSE
            }
            ClipboardPdu::LockClipboardData { clip_data_id } => {
                body.put_u32_le(*clip_data_id);
                MSG_LOCK_CLIPDATA
            }
            ClipboardPdu::UnlockClipboardData { clip_data_id } => {
                body.put_u32_le(*clip_data_id);
                MSG_UNLOCK_CLIPDATA
            }
        };

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        out.put_u16_le(msg_type);
        out.put_u16_le(flags.bits());
        out.put_u32_le(body.len() as u32);
        out.put_slice(&body);
        out.freeze()
    }

    /// Parse one message from the exact wire layout.
    pub fn decode(raw: &[u8]) -> Result<Self, RdviewError> {
        if raw.len() < HEADER_LEN {
            return Err(RdviewError::InvalidPdu("truncated header"));
        }
        let mut header = &raw[..HEADER_LEN];
        let msg_type = header.get_u16_le();
        let flags = MessageFlags::from_bits_truncate(header.get_u16_le());
        let data_len = header.get_u32_le() as usize;

        if raw.len() < HEADER_LEN + data_len {
            return Err(RdviewError::InvalidPdu("truncated body"));
        }
        let mut body = &raw[HEADER_LEN..HEADER_LEN + data_len];

        match msg_type {
            MSG_MONITOR_READY => Ok(ClipboardPdu::MonitorReady),
            MSG_CLIP_CAPS => decode_capabilities(body),
            MSG_FORMAT_LIST => decode_format_list(body),
            MSG_FORMAT_LIST_RESPONSE => Ok(ClipboardPdu::FormatListResponse {
                ok: !flags.contains(MessageFlags::RESPONSE_FAIL),
            }),
            MSG_FORMAT_DATA_REQUEST => {
                if body.len() < 4 {
                    return Err(RdviewError::InvalidPdu("short format data request"));
                }
                Ok(ClipboardPdu::FormatDataRequest {
                    format_id: body.get_u32_le(),
                })
            }
            MSG_FORMAT_DATA_RESPONSE => Ok(ClipboardPdu::FormatDataResponse {
                ok: !flags.contains(MessageFlags::RESPONSE_FAIL),
                data: Bytes::copy_from_slice(body),
            }),
            MSG_LOCK_CLIPDATA => {
                if body.len() < 4 {
                    return Err(RdviewError::InvalidPdu("short lock message"));
                }
                Ok(ClipboardPdu::LockClipboardData {
                    clip_data_id: body.get_u32_le(),
                })
            }
            MSG_UNLOCK_CLIPDATA => {
                if body.len() < 4 {
                    return Err(RdviewError::InvalidPdu("short unlock message"));
                }
                Ok(ClipboardPdu::UnlockClipboardData {
                    clip_data_id: body.get_u32_le(),
                })
            }
            other => Err(RdviewError::UnknownVariant {
                type_name: "clipboard message type",
                value: other as u64,
            }),
        }
    }
}

fn decode_capabilities(mut body: &[u8]) -> Result<ClipboardPdu, RdviewError> {
    if body.len() < 4 {
        return Err(RdviewError::InvalidPdu("short capabilities message"));
    }
    let set_count = body.get_u16_le();
    let _pad = body.get_u16_le();

    let mut general_flags = GeneralFlags::empty();
    for _ in 0..set_count {
        if body.len() < 4 {
            return Err(RdviewError::InvalidPdu("truncated capability set"));
        }
        let set_type = body.get_u16_le();
        let set_len = body.get_u16_le() as usize;
        let payload_len = set_len.saturating_sub(4);
        if body.len() < payload_len {
            return Err(RdviewError::InvalidPdu("truncated capability set"));
        }
        if set_type == CAPSTYPE_GENERAL && payload_len >= 8 {
            let mut payload = &body[..payload_len];
            let _version = payload.get_u32_le();
            general_flags = GeneralFlags::from_bits_truncate(payload.get_u32_le());
        }
        body.advance(payload_len);
    }
    Ok(ClipboardPdu::Capabilities { general_flags })
}

fn decode_format_list(mut body: &[u8]) -> Result<ClipboardPdu, RdviewError> {
    // Long format names: {id: u32, name: UTF-16LE, 0x0000}*
    let mut formats = Vec::new();
    while body.len() >= 6 {
        let id = body.get_u32_le();
        let mut units = Vec::new();
        loop {
            if body.len() < 2 {
                return Err(RdviewError::InvalidPdu("unterminated format name"));
            }
            let unit = body.get_u16_le();
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        let name = if units.is_empty() {
            None
        } else {
            Some(String::from_utf16_lossy(&units))
        };
        formats.push(FormatEntry { id, name });
    }
    if !body.is_empty() {
        return Err(RdviewError::InvalidPdu("trailing bytes in format list"));
    }
    Ok(ClipboardPdu::FormatList { formats })
}

// ── Text payload helpers ─────────────────────────────────────────

/// Normalize to the protocol's CR/LF line endings.
fn to_crlf(text: &str) -> String {
    text.replace('\r', "").replace('\n', "\r\n")
}

/// Normalize wire text back to LF line endings.
fn from_crlf(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Encode clipboard text for a requested format.
///
/// The result length is the character count *including* the null
/// terminator, times the encoding unit size. Returns `None` for
/// formats that do not carry text.
pub fn encode_text(text: &str, format_id: u32) -> Option<Vec<u8>> {
    let normalized = to_crlf(text);
    match format_id {
        CF_UNICODETEXT => {
            let mut out = Vec::with_capacity((normalized.len() + 1) * 2);
            for unit in normalized.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&0u16.to_le_bytes());
            Some(out)
        }
        CF_TEXT => {
            let mut out = Vec::with_capacity(normalized.len() + 1);
            for c in normalized.chars() {
                out.push(if (c as u32) <= 0xFF { c as u8 } else { b'?' });
            }
            out.push(0);
            Some(out)
        }
        _ => None,
    }
}

/// Decode a received text payload for the format it was requested in.
pub fn decode_text(data: &[u8], format_id: u32) -> Option<String> {
    match format_id {
        CF_UNICODETEXT => {
            let mut units = Vec::with_capacity(data.len() / 2);
            for pair in data.chunks_exact(2) {
                let unit = u16::from_le_bytes([pair[0], pair[1]]);
                if unit == 0 {
                    break;
                }
                units.push(unit);
            }
            Some(from_crlf(&String::from_utf16_lossy(&units)))
        }
        CF_TEXT => {
            let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            let text: String = data[..end].iter().map(|&b| b as char).collect();
            Some(from_crlf(&text))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_exact_bytes() {
        let pdu = ClipboardPdu::Capabilities {
            general_flags: GeneralFlags::USE_LONG_FORMAT_NAMES,
        };
        let bytes = pdu.encode();
        assert_eq!(
            &bytes[..],
            &[
                0x07, 0x00, // msg type
                0x00, 0x00, // flags
                0x10, 0x00, 0x00, 0x00, // body length (16)
                0x01, 0x00, // one capability set
                0x00, 0x00, // pad
                0x01, 0x00, // general set
                0x0C, 0x00, // set length (12)
                0x02, 0x00, 0x00, 0x00, // version 2
                0x02, 0x00, 0x00, 0x00, // long format names
            ]
        );
    }

    #[test]
    fn capabilities_round_trip() {
        let pdu = ClipboardPdu::Capabilities {
            general_flags: GeneralFlags::USE_LONG_FORMAT_NAMES | GeneralFlags::CAN_LOCK_CLIPDATA,
        };
        let decoded = ClipboardPdu::decode(&pdu.encode()).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn format_list_round_trip() {
        let pdu = ClipboardPdu::FormatList {
            formats: vec![
                FormatEntry::new(CF_TEXT),
                FormatEntry::new(CF_UNICODETEXT),
                FormatEntry {
                    id: 0xC004,
                    name: Some("HTML Format".into()),
                },
            ],
        };
        let decoded = ClipboardPdu::decode(&pdu.encode()).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn unnamed_format_entry_is_six_bytes() {
        let pdu = ClipboardPdu::FormatList {
            formats: vec![FormatEntry::new(CF_TEXT)],
        };
        let bytes = pdu.encode();
        // header + u32 id + u16 terminator
        assert_eq!(bytes.len(), 8 + 6);
    }

    #[test]
    fn data_request_round_trip() {
        let pdu = ClipboardPdu::FormatDataRequest {
            format_id: CF_UNICODETEXT,
        };
        let decoded = ClipboardPdu::decode(&pdu.encode()).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn failed_response_flag() {
        let pdu = ClipboardPdu::FormatDataResponse {
            ok: false,
            data: Bytes::new(),
        };
        let bytes = pdu.encode();
        assert_eq!(bytes[2], 0x02); // RESPONSE_FAIL
        let decoded = ClipboardPdu::decode(&bytes).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn unknown_message_type() {
        let raw = [0x99u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let err = ClipboardPdu::decode(&raw).unwrap_err();
        assert!(matches!(err, RdviewError::UnknownVariant { .. }));
    }

    #[test]
    fn truncated_body_rejected() {
        let mut raw = ClipboardPdu::FormatDataRequest { format_id: 1 }
            .encode()
            .to_vec();
        raw.truncate(10);
        let err = ClipboardPdu::decode(&raw).unwrap_err();
        assert!(matches!(err, RdviewError::InvalidPdu(_)));
    }

    #[test]
    fn unicode_length_counts_terminator() {
        // "hi" → 3 characters including the terminator, 2 bytes each.
        let data = encode_text("hi", CF_UNICODETEXT).unwrap();
        assert_eq!(data.len(), 6);
        assert_eq!(&data[4..], &[0, 0]);
    }

    #[test]
    fn text_newlines_become_crlf() {
        let data = encode_text("a\nb", CF_TEXT).unwrap();
        assert_eq!(data, b"a\r\nb\0");

        let data = encode_text("a\nb", CF_UNICODETEXT).unwrap();
        // a, CR, LF, b, NUL → 5 units.
        assert_eq!(data.len(), 10);
    }

    #[test]
    fn crlf_already_normalized_is_not_doubled() {
        let data = encode_text("a\r\nb", CF_TEXT).unwrap();
        assert_eq!(data, b"a\r\nb\0");
    }

    #[test]
    fn decode_unicode_stops_at_terminator() {
        let data = encode_text("x\ny", CF_UNICODETEXT).unwrap();
        assert_eq!(decode_text(&data, CF_UNICODETEXT).unwrap(), "x\ny");
    }

    #[test]
    fn decode_plain_text() {
        assert_eq!(decode_text(b"ab\r\ncd\0junk", CF_TEXT).unwrap(), "ab\ncd");
    }

    #[test]
    fn non_text_formats_have_no_encoding() {
        assert!(encode_text("x", 0xC004).is_none());
        assert!(decode_text(b"x", 0xC004).is_none());
    }
}
