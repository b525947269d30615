//! Clipboard synchronization bridge.
//!
//! A small asymmetric state machine between the local clipboard and
//! the remote clipboard channel. Two flows share one synchronization
//! gate:
//!
//! - remote → local: remote format list → one format-data request →
//!   response decoded and pushed to the local clipboard;
//! - local → remote: local change re-advertises our format list, the
//!   remote then requests the data symmetrically.
//!
//! At most one format-data request is outstanding per direction. A
//! newer remote format list supersedes the in-flight request; the
//! stale response is discarded and a fresh request is issued for the
//! latest list.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::clipboard::pdu::{
    CF_TEXT, CF_UNICODETEXT, ClipboardPdu, FormatEntry, GeneralFlags, decode_text, encode_text,
};
use crate::error::RdviewError;

/// Protocol-defined name of the clipboard static virtual channel.
pub const CLIPBOARD_CHANNEL_NAME: &str = "cliprdr";

// ── Collaborator traits ──────────────────────────────────────────

/// Outbound half of the clipboard channel.
pub trait ClipboardChannel: Send + Sync {
    fn send(&self, pdu: &ClipboardPdu) -> Result<(), RdviewError>;
}

/// The local clipboard, monitored and mutated on the processing
/// thread so clipboard traffic never blocks the presentation thread.
pub trait LocalClipboard: Send + Sync {
    /// Replace the local clipboard text.
    fn set_text(&self, text: &str);
    /// Current local clipboard text, if any.
    fn text(&self) -> Option<String>;
}

// ── ClipboardBridge ──────────────────────────────────────────────

struct BridgeState {
    /// Set once the monitor-ready handshake completed.
    synchronized: bool,
    /// Capability flags advertised by the remote side.
    remote_flags: GeneralFlags,
    /// The remote format table, replaced wholesale per format list.
    remote_formats: Vec<FormatEntry>,
    /// Format id of the in-flight format-data request.
    pending: Option<u32>,
    /// The in-flight request was superseded by a newer format list;
    /// its response must be discarded.
    pending_superseded: bool,
    /// Format to request once the superseded response has drained.
    queued_interest: Option<u32>,
    /// Text remembered from the local clipboard.
    local_text: Option<String>,
}

/// Mediates between the local clipboard and the remote channel.
pub struct ClipboardBridge {
    channel: Arc<dyn ClipboardChannel>,
    local: Arc<dyn LocalClipboard>,
    state: Mutex<BridgeState>,
}

impl ClipboardBridge {
    pub fn new(channel: Arc<dyn ClipboardChannel>, local: Arc<dyn LocalClipboard>) -> Self {
        Self {
            channel,
            local,
            state: Mutex::new(BridgeState {
                synchronized: false,
                remote_flags: GeneralFlags::empty(),
                remote_formats: Vec::new(),
                pending: None,
                pending_superseded: false,
                queued_interest: None,
                local_text: None,
            }),
        }
    }

    /// Whether the monitor-ready handshake has completed.
    pub fn is_synchronized(&self) -> bool {
        self.state.lock().unwrap().synchronized
    }

    /// The current remote format table.
    pub fn remote_formats(&self) -> Vec<FormatEntry> {
        self.state.lock().unwrap().remote_formats.clone()
    }

    /// Capability flags the remote side advertised.
    pub fn remote_capabilities(&self) -> GeneralFlags {
        self.state.lock().unwrap().remote_flags
    }

    /// Handle one raw message from the channel.
    pub fn handle_pdu(&self, raw: &[u8]) -> Result<(), RdviewError> {
        match ClipboardPdu::decode(raw)? {
            ClipboardPdu::MonitorReady => self.on_monitor_ready(),
            ClipboardPdu::Capabilities { general_flags } => {
                self.state.lock().unwrap().remote_flags = general_flags;
                Ok(())
            }
            ClipboardPdu::FormatList { formats } => self.on_remote_format_list(formats),
            ClipboardPdu::FormatListResponse { ok } => {
                debug!(ok, "format list acknowledged by remote");
                Ok(())
            }
            ClipboardPdu::FormatDataRequest { format_id } => self.on_data_request(format_id),
            ClipboardPdu::FormatDataResponse { ok, data } => self.on_data_response(ok, &data),
            ClipboardPdu::LockClipboardData { clip_data_id }
            | ClipboardPdu::UnlockClipboardData { clip_data_id } => {
                debug!(clip_data_id, "ignoring clipboard lock message");
                Ok(())
            }
        }
    }

    /// Note a change of the local clipboard.
    ///
    /// Remembers the text and re-advertises our format list so the
    /// remote side requests the data in turn.
    pub fn local_changed(&self, text: &str) -> Result<(), RdviewError> {
        // Privacy: log only the length, clipboard text regularly
        // holds passwords.
        debug!(len = text.len(), "local clipboard changed");

        let synchronized = {
            let mut state = self.state.lock().unwrap();
            state.local_text = Some(text.to_owned());
            state.synchronized
        };
        if synchronized {
            self.channel.send(&Self::local_format_list())?;
        }
        Ok(())
    }

    /// Tear down per-session state when the channel or session ends.
    pub fn session_ended(&self) {
        let mut state = self.state.lock().unwrap();
        state.synchronized = false;
        state.pending = None;
        state.pending_superseded = false;
        state.queued_interest = None;
        state.remote_formats.clear();
    }

    // ── Inbound handlers ─────────────────────────────────────────

    /// Monitor-ready handshake: capabilities, then our format list.
    /// Both sends must succeed for the channel to synchronize.
    fn on_monitor_ready(&self) -> Result<(), RdviewError> {
        self.channel
            .send(&ClipboardPdu::Capabilities {
                general_flags: GeneralFlags::USE_LONG_FORMAT_NAMES,
            })
            .map_err(|_| RdviewError::Channel("capabilities send failed"))?;
        self.channel
            .send(&Self::local_format_list())
            .map_err(|_| RdviewError::Channel("format list send failed"))?;

        self.state.lock().unwrap().synchronized = true;
        debug!("clipboard channel synchronized");
        Ok(())
    }

    fn on_remote_format_list(&self, formats: Vec<FormatEntry>) -> Result<(), RdviewError> {
        let wanted = preferred_text_format(&formats);

        let request_now = {
            let mut state = self.state.lock().unwrap();
            state.remote_formats = formats;
            match (wanted, state.pending) {
                (Some(id), None) => {
                    state.pending = Some(id);
                    Some(id)
                }
                (Some(id), Some(_)) => {
                    // Only the latest list matters; let the stale
                    // response drain before re-requesting.
                    state.pending_superseded = true;
                    state.queued_interest = Some(id);
                    None
                }
                (None, Some(_)) => {
                    state.pending_superseded = true;
                    state.queued_interest = None;
                    None
                }
                (None, None) => None,
            }
        };

        // Acknowledge the list regardless of content.
        if let Err(e) = self.channel.send(&ClipboardPdu::FormatListResponse { ok: true }) {
            warn!("format list response failed: {e}");
        }

        if let Some(format_id) = request_now {
            self.channel
                .send(&ClipboardPdu::FormatDataRequest { format_id })?;
        }
        Ok(())
    }

    fn on_data_request(&self, format_id: u32) -> Result<(), RdviewError> {
        let text = self.state.lock().unwrap().local_text.clone();
        let payload = text.as_deref().and_then(|t| encode_text(t, format_id));

        let response = match payload {
            Some(data) => ClipboardPdu::FormatDataResponse {
                ok: true,
                data: data.into(),
            },
            None => ClipboardPdu::FormatDataResponse {
                ok: false,
                data: bytes::Bytes::new(),
            },
        };
        self.channel.send(&response)
    }

    fn on_data_response(&self, ok: bool, data: &[u8]) -> Result<(), RdviewError> {
        let (format_id, retry) = {
            let mut state = self.state.lock().unwrap();
            let Some(format_id) = state.pending.take() else {
                debug!("discarding unsolicited format data response");
                return Ok(());
            };
            if state.pending_superseded {
                state.pending_superseded = false;
                let retry = state.queued_interest.take();
                if let Some(id) = retry {
                    state.pending = Some(id);
                }
                (None, retry)
            } else {
                (Some(format_id), None)
            }
        };

        if let Some(format_id) = retry {
            debug!("re-requesting clipboard data after superseded list");
            return self
                .channel
                .send(&ClipboardPdu::FormatDataRequest { format_id });
        }

        let Some(format_id) = format_id else {
            debug!("discarding response for superseded clipboard request");
            return Ok(());
        };

        // A failure response is not an error; the local clipboard is
        // simply left untouched.
        if !ok {
            debug!("remote reported no clipboard data");
            return Ok(());
        }

        if let Some(text) = decode_text(data, format_id) {
            debug!(len = text.len(), "updating local clipboard from remote");
            self.local.set_text(&text);
        }
        Ok(())
    }

    /// The formats we advertise: plain text and Unicode text.
    fn local_format_list() -> ClipboardPdu {
        ClipboardPdu::FormatList {
            formats: vec![FormatEntry::new(CF_TEXT), FormatEntry::new(CF_UNICODETEXT)],
        }
    }
}

/// Pick the text format to request: Unicode preferred over plain.
fn preferred_text_format(formats: &[FormatEntry]) -> Option<u32> {
    if formats.iter().any(|f| f.id == CF_UNICODETEXT) {
        Some(CF_UNICODETEXT)
    } else if formats.iter().any(|f| f.id == CF_TEXT) {
        Some(CF_TEXT)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<ClipboardPdu>>,
        fail_sends: Mutex<bool>,
    }

    impl RecordingChannel {
        fn sent(&self) -> Vec<ClipboardPdu> {
            self.sent.lock().unwrap().clone()
        }

        fn set_failing(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }
    }

    impl ClipboardChannel for RecordingChannel {
        fn send(&self, pdu: &ClipboardPdu) -> Result<(), RdviewError> {
            if *self.fail_sends.lock().unwrap() {
                return Err(RdviewError::ChannelClosed);
            }
            self.sent.lock().unwrap().push(pdu.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeClipboard {
        text: Mutex<Option<String>>,
    }

    impl LocalClipboard for FakeClipboard {
        fn set_text(&self, text: &str) {
            *self.text.lock().unwrap() = Some(text.to_owned());
        }

        fn text(&self) -> Option<String> {
            self.text.lock().unwrap().clone()
        }
    }

    fn bridge() -> (Arc<RecordingChannel>, Arc<FakeClipboard>, ClipboardBridge) {
        let channel = Arc::new(RecordingChannel::default());
        let clipboard = Arc::new(FakeClipboard::default());
        let bridge = ClipboardBridge::new(channel.clone(), clipboard.clone());
        (channel, clipboard, bridge)
    }

    fn feed(bridge: &ClipboardBridge, pdu: ClipboardPdu) {
        bridge.handle_pdu(&pdu.encode()).unwrap();
    }

    fn data_requests(sent: &[ClipboardPdu]) -> Vec<u32> {
        sent.iter()
            .filter_map(|p| match p {
                ClipboardPdu::FormatDataRequest { format_id } => Some(*format_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn monitor_ready_handshake() {
        let (channel, _, bridge) = bridge();
        feed(&bridge, ClipboardPdu::MonitorReady);

        let sent = channel.sent();
        assert!(matches!(sent[0], ClipboardPdu::Capabilities { general_flags }
            if general_flags.contains(GeneralFlags::USE_LONG_FORMAT_NAMES)));
        assert!(matches!(&sent[1], ClipboardPdu::FormatList { formats }
            if formats.iter().map(|f| f.id).collect::<Vec<_>>() == vec![CF_TEXT, CF_UNICODETEXT]));
        assert!(bridge.is_synchronized());
    }

    #[test]
    fn failed_handshake_is_channel_error() {
        let (channel, _, bridge) = bridge();
        channel.set_failing(true);
        let err = bridge.handle_pdu(&ClipboardPdu::MonitorReady.encode()).unwrap_err();
        assert!(matches!(err, RdviewError::Channel(_)));
        assert!(!bridge.is_synchronized());
    }

    #[test]
    fn remote_capabilities_are_stored() {
        let (_, _, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::Capabilities {
                general_flags: GeneralFlags::USE_LONG_FORMAT_NAMES,
            },
        );
        assert!(
            bridge
                .remote_capabilities()
                .contains(GeneralFlags::USE_LONG_FORMAT_NAMES)
        );
    }

    #[test]
    fn plain_text_only_list_requests_plain_text() {
        let (channel, _, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_TEXT)],
            },
        );
        assert_eq!(data_requests(&channel.sent()), vec![CF_TEXT]);
    }

    #[test]
    fn unicode_preferred_over_plain() {
        let (channel, _, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_TEXT), FormatEntry::new(CF_UNICODETEXT)],
            },
        );
        assert_eq!(data_requests(&channel.sent()), vec![CF_UNICODETEXT]);
    }

    #[test]
    fn format_list_replaces_previous_table() {
        let (_, _, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_TEXT), FormatEntry::new(0xC004)],
            },
        );
        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: false,
                data: Bytes::new(),
            },
        );
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_UNICODETEXT)],
            },
        );
        let ids: Vec<u32> = bridge.remote_formats().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![CF_UNICODETEXT]);
    }

    #[test]
    fn successful_response_updates_local_clipboard() {
        let (_, clipboard, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_UNICODETEXT)],
            },
        );
        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: true,
                data: encode_text("hello\nworld", CF_UNICODETEXT).unwrap().into(),
            },
        );
        assert_eq!(clipboard.text().unwrap(), "hello\nworld");
    }

    #[test]
    fn failed_response_never_mutates_local_clipboard() {
        let (_, clipboard, bridge) = bridge();
        clipboard.set_text("before");
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_UNICODETEXT)],
            },
        );
        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: false,
                data: Bytes::new(),
            },
        );
        assert_eq!(clipboard.text().unwrap(), "before");
    }

    #[test]
    fn stale_response_for_superseded_list_is_ignored() {
        let (channel, clipboard, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_TEXT)],
            },
        );
        // A second list arrives before the response to the first.
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_UNICODETEXT)],
            },
        );
        // The stale CF_TEXT response must not reach the clipboard…
        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: true,
                data: encode_text("stale", CF_TEXT).unwrap().into(),
            },
        );
        assert!(clipboard.text().is_none());
        // …and a fresh request for the newer list goes out.
        assert_eq!(data_requests(&channel.sent()), vec![CF_TEXT, CF_UNICODETEXT]);

        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: true,
                data: encode_text("fresh", CF_UNICODETEXT).unwrap().into(),
            },
        );
        assert_eq!(clipboard.text().unwrap(), "fresh");
    }

    #[test]
    fn unsolicited_response_is_discarded() {
        let (_, clipboard, bridge) = bridge();
        feed(
            &bridge,
            ClipboardPdu::FormatDataResponse {
                ok: true,
                data: encode_text("ghost", CF_UNICODETEXT).unwrap().into(),
            },
        );
        assert!(clipboard.text().is_none());
    }

    #[test]
    fn remote_request_served_from_remembered_text() {
        let (channel, _, bridge) = bridge();
        feed(&bridge, ClipboardPdu::MonitorReady);
        bridge.local_changed("secret\ntext").unwrap();

        feed(&bridge, ClipboardPdu::FormatDataRequest { format_id: CF_UNICODETEXT });

        let sent = channel.sent();
        let ClipboardPdu::FormatDataResponse { ok, data } = sent.last().unwrap() else {
            panic!("expected a data response");
        };
        assert!(*ok);
        // character count including terminator, times two.
        assert_eq!(data.len(), "secret\r\ntext".chars().count() * 2 + 2);
    }

    #[test]
    fn remote_request_without_cached_text_fails() {
        let (channel, _, bridge) = bridge();
        feed(&bridge, ClipboardPdu::FormatDataRequest { format_id: CF_TEXT });
        let sent = channel.sent();
        assert!(matches!(sent.last().unwrap(),
            ClipboardPdu::FormatDataResponse { ok: false, .. }));
    }

    #[test]
    fn remote_request_for_unknown_format_fails() {
        let (channel, _, bridge) = bridge();
        feed(&bridge, ClipboardPdu::MonitorReady);
        bridge.local_changed("text").unwrap();
        feed(&bridge, ClipboardPdu::FormatDataRequest { format_id: 0xC004 });
        let sent = channel.sent();
        assert!(matches!(sent.last().unwrap(),
            ClipboardPdu::FormatDataResponse { ok: false, .. }));
    }

    #[test]
    fn local_change_readvertises_formats_once_synchronized() {
        let (channel, _, bridge) = bridge();

        // Before the handshake nothing goes out.
        bridge.local_changed("early").unwrap();
        assert!(channel.sent().is_empty());

        feed(&bridge, ClipboardPdu::MonitorReady);
        let before = channel.sent().len();
        bridge.local_changed("later").unwrap();
        let sent = channel.sent();
        assert_eq!(sent.len(), before + 1);
        assert!(matches!(sent.last().unwrap(), ClipboardPdu::FormatList { .. }));
    }

    #[test]
    fn session_end_clears_pending_state() {
        let (_, _, bridge) = bridge();
        feed(&bridge, ClipboardPdu::MonitorReady);
        feed(
            &bridge,
            ClipboardPdu::FormatList {
                formats: vec![FormatEntry::new(CF_TEXT)],
            },
        );
        bridge.session_ended();
        assert!(!bridge.is_synchronized());
        assert!(bridge.remote_formats().is_empty());
    }
}
