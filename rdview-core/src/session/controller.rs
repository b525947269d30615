//! Session controller — orchestrates one connection attempt.
//!
//! Owns the protocol-engine handle and every per-session buffer,
//! routes inbound engine callbacks to the screen pipeline, pointer
//! cache and clipboard bridge, and translates presentation-side input
//! into engine calls.
//!
//! Engine callbacks run on the processing thread; everything the
//! presentation thread must see crosses over through the
//! [`SessionEvent`] queue. The `Disconnected` notification fires
//! exactly once per session no matter which path ended it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::clipboard::{CLIPBOARD_CHANNEL_NAME, ClipboardBridge, ClipboardChannel, ClipboardPdu,
    LocalClipboard};
use crate::config::SessionConfig;
use crate::cursor::{PixelConverter, PointerCache, PointerHandle, convert_pointer};
use crate::engine::{
    BitmapCodec, LibraryGuard, NegotiationCapabilities, PointerBitmap, ProtocolEngine,
    RectangleUpdate,
};
use crate::error::RdviewError;
use crate::input::{MouseButton, ModifierTracker, PointerFlags, key_flags, wheel_flags};
use crate::screen::{Image, Point, RemoteScreenBuffer, ScreenPipeline, Size};
use crate::session::events::{SessionEvent, SessionNotifier, notification_channel};
use crate::session::state::SessionPhase;

// ── EngineChannel ────────────────────────────────────────────────

/// Clipboard channel transport backed by the engine's static virtual
/// channel.
struct EngineChannel {
    engine: Arc<dyn ProtocolEngine>,
}

impl ClipboardChannel for EngineChannel {
    fn send(&self, pdu: &ClipboardPdu) -> Result<(), RdviewError> {
        self.engine
            .send_channel_data(CLIPBOARD_CHANNEL_NAME, pdu.encode())
    }
}

// ── SessionController ────────────────────────────────────────────

/// One session: created on connect request, terminal after
/// disconnect. Never reused.
pub struct SessionController {
    config: Mutex<SessionConfig>,
    engine: Arc<dyn ProtocolEngine>,
    codec: Arc<dyn BitmapCodec>,
    pixels: Arc<dyn PixelConverter>,
    local_clipboard: Arc<dyn LocalClipboard>,
    _library: LibraryGuard,

    phase: Mutex<SessionPhase>,
    phase_tx: watch::Sender<SessionPhase>,
    notifier: SessionNotifier,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,

    pipeline: RwLock<Option<Arc<ScreenPipeline>>>,
    pointers: PointerCache,
    clipboard: Mutex<Option<Arc<ClipboardBridge>>>,
    surface: Mutex<Size>,
    modifiers: Mutex<ModifierTracker>,
    disconnect_notified: AtomicBool,
}

impl SessionController {
    /// Create a fresh session around an engine handle.
    ///
    /// Acquires the process-global engine [`LibraryGuard`]; global
    /// library init therefore happens before any session work and is
    /// torn down only after the last controller is dropped.
    pub fn new(
        config: SessionConfig,
        engine: Arc<dyn ProtocolEngine>,
        codec: Arc<dyn BitmapCodec>,
        pixels: Arc<dyn PixelConverter>,
        local_clipboard: Arc<dyn LocalClipboard>,
    ) -> Result<Self, RdviewError> {
        let library = LibraryGuard::acquire(Arc::clone(&engine))?;
        let (notifier, events_rx) = notification_channel();
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);

        Ok(Self {
            config: Mutex::new(config),
            engine,
            codec,
            pixels,
            local_clipboard,
            _library: library,
            phase: Mutex::new(SessionPhase::Idle),
            phase_tx,
            notifier,
            events_rx: Mutex::new(Some(events_rx)),
            pipeline: RwLock::new(None),
            pointers: PointerCache::new(),
            clipboard: Mutex::new(None),
            surface: Mutex::new(Size::default()),
            modifiers: Mutex::new(ModifierTracker::new()),
            disconnect_notified: AtomicBool::new(false),
        })
    }

    // ── Observation ──────────────────────────────────────────────

    /// Take the notification receiver. Yields `Some` exactly once;
    /// the presentation layer owns it from then on.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase.lock().unwrap().clone()
    }

    /// Subscribe to phase changes.
    pub fn phase_watch(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// The screen pipeline, once the session is connected.
    pub fn screen(&self) -> Option<Arc<ScreenPipeline>> {
        self.pipeline.read().unwrap().clone()
    }

    /// Repaint query: the current letterboxed desktop image.
    pub fn snapshot(&self) -> Option<Image> {
        self.screen().map(|p| p.snapshot())
    }

    // ── Presentation boundary: lifecycle ─────────────────────────

    /// Request a desktop size before connecting.
    pub fn set_desktop_size(&self, width: u16, height: u16) -> Result<(), RdviewError> {
        {
            let phase = self.phase.lock().unwrap();
            if !matches!(*phase, SessionPhase::Idle) {
                return Err(RdviewError::ProtocolViolation(
                    "desktop size is fixed once a connection is attempted",
                ));
            }
        }
        let mut config = self.config.lock().unwrap();
        config.display.desktop_width = width;
        config.display.desktop_height = height;
        Ok(())
    }

    /// Start the connection attempt.
    ///
    /// Validates the configuration first; nothing reaches the engine
    /// when the parameters are bad.
    pub fn connect(&self) -> Result<(), RdviewError> {
        let settings = {
            let config = self.config.lock().unwrap();
            config.validate()?;
            config.engine_settings()
        };

        self.transition(|p| p.begin_connect())?;

        if let Err(e) = self.engine.apply_settings(&settings) {
            let reason = format!("engine rejected settings: {e}");
            self.finish_session(Some(reason.clone()));
            return Err(RdviewError::Connection(reason));
        }

        info!(host = %settings.host, port = settings.port, "connecting");
        Ok(())
    }

    /// Explicit stop request. Interrupts the engine's receive loop
    /// and tears the session down. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let began = {
            let mut phase = self.phase.lock().unwrap();
            phase.begin_disconnect().is_ok()
        };
        if !began {
            debug!("disconnect requested with no live connection");
            return;
        }
        let _ = self.phase_tx.send(SessionPhase::Disconnecting);

        self.engine.request_stop();
        self.finish_session(None);
    }

    /// Update the presentation surface size; recomputes the derived
    /// views.
    pub fn resize_surface(&self, surface: Size) {
        *self.surface.lock().unwrap() = surface;
        if let Some(pipeline) = self.screen() {
            pipeline.resize_surface(surface);
        }
    }

    /// Map a surface point to the remote desktop pixel under it.
    pub fn map_to_desktop(&self, position: Point) -> Option<Point> {
        self.screen().map(|p| p.map_to_source(position))
    }

    // ── Presentation boundary: input injection ───────────────────

    /// Inject a mouse move at surface coordinates.
    pub fn send_mouse_move(&self, position: Point) -> Result<(), RdviewError> {
        let Some((x, y)) = self.map_to_wire(position) else {
            return Ok(());
        };
        self.engine.send_pointer(PointerFlags::MOVE, x, y)
    }

    /// Inject a mouse button press or release.
    pub fn send_mouse_button(
        &self,
        button: MouseButton,
        pressed: bool,
        position: Point,
    ) -> Result<(), RdviewError> {
        let Some((x, y)) = self.map_to_wire(position) else {
            return Ok(());
        };
        let mut flags = button.flags();
        if pressed {
            flags |= PointerFlags::DOWN;
        }
        self.engine.send_pointer(flags, x, y)
    }

    /// Inject a wheel rotation.
    pub fn send_mouse_wheel(&self, delta: i16, position: Point) -> Result<(), RdviewError> {
        let Some((x, y)) = self.map_to_wire(position) else {
            return Ok(());
        };
        self.engine.send_pointer(wheel_flags(delta), x, y)
    }

    /// Inject a keyboard scancode event.
    pub fn send_key(&self, scancode: u16, pressed: bool) -> Result<(), RdviewError> {
        if !self.phase().is_connected() {
            trace!("ignoring key event while not connected");
            return Ok(());
        }
        self.modifiers.lock().unwrap().note_key(scancode, pressed);
        self.engine.send_scancode(scancode, key_flags(scancode, pressed))
    }

    /// Inject the keyboard-pause sequence.
    pub fn send_keyboard_pause(&self) -> Result<(), RdviewError> {
        if !self.phase().is_connected() {
            return Ok(());
        }
        self.engine.send_keyboard_pause()
    }

    /// The presentation surface lost focus: stop remote auto-repeat
    /// and release any modifier keys left pressed mid-chord.
    pub fn focus_lost(&self) -> Result<(), RdviewError> {
        let recovery = self.modifiers.lock().unwrap().drain_for_focus_loss();
        if !self.phase().is_connected() {
            return Ok(());
        }
        if recovery.send_pause {
            self.engine.send_keyboard_pause()?;
        }
        for scancode in recovery.release_scancodes {
            self.engine
                .send_scancode(scancode, key_flags(scancode, false))?;
        }
        Ok(())
    }

    /// The local clipboard changed; advertise it to the remote side.
    pub fn clipboard_changed(&self, text: &str) -> Result<(), RdviewError> {
        let bridge = self.clipboard.lock().unwrap().clone();
        match bridge {
            Some(bridge) => bridge.local_changed(text),
            None => {
                debug!("clipboard change with no synchronized channel");
                Ok(())
            }
        }
    }

    // ── Engine callbacks (processing thread) ─────────────────────

    /// Pre-connect readiness: register negotiation capabilities.
    pub fn on_pre_connect(&self) -> Result<(), RdviewError> {
        self.transition(|p| p.begin_negotiation())?;

        let caps = NegotiationCapabilities::new(self.config.lock().unwrap().display.bitmap_cache);
        if let Err(e) = self.engine.register_capabilities(&caps) {
            let reason = format!("capability registration failed: {e}");
            self.finish_session(Some(reason.clone()));
            return Err(RdviewError::Connection(reason));
        }

        self.notifier.send(SessionEvent::AboutToConnect);
        Ok(())
    }

    /// Post-connect readiness: geometry is final, allocate buffers.
    pub fn on_post_connect(&self) -> Result<(), RdviewError> {
        let geometry = self.engine.desktop_geometry();
        let format = match geometry.pixel_format() {
            Ok(format) if geometry.width > 0 && geometry.height > 0 => format,
            Ok(_) => {
                let reason = "engine reported an empty desktop".to_owned();
                self.finish_session(Some(reason.clone()));
                return Err(RdviewError::Connection(reason));
            }
            Err(e) => {
                let reason = format!("unusable desktop geometry: {e}");
                self.finish_session(Some(reason.clone()));
                return Err(RdviewError::Connection(reason));
            }
        };

        let buffer = Arc::new(RemoteScreenBuffer::new(geometry.width, geometry.height, format));
        let surface = *self.surface.lock().unwrap();
        *self.pipeline.write().unwrap() = Some(Arc::new(ScreenPipeline::new(buffer, surface)));

        self.transition(|p| p.complete_negotiation())?;
        info!(
            width = geometry.width,
            height = geometry.height,
            depth = geometry.color_depth,
            "session connected"
        );
        self.notifier.send(SessionEvent::Connected);
        Ok(())
    }

    /// Negotiation or transport failure. Terminal.
    pub fn on_session_error(&self, reason: &str) {
        warn!("session failed: {reason}");
        self.finish_session(Some(reason.to_owned()));
    }

    /// The engine's receive loop ended (remote drop or after a stop
    /// request).
    pub fn on_engine_disconnected(&self) {
        {
            let mut phase = self.phase.lock().unwrap();
            let _ = phase.begin_disconnect();
        }
        self.finish_session(None);
    }

    /// A batch of rectangle updates. Applies every rectangle it can
    /// and coalesces the batch into a single `DesktopUpdated`
    /// notification.
    pub fn on_bitmap_update(&self, updates: &[RectangleUpdate]) {
        let Some(pipeline) = self.screen() else {
            warn!("bitmap update before the desktop buffer exists");
            return;
        };
        if updates.is_empty() {
            return;
        }

        for update in updates {
            let data = if update.compressed {
                match self.codec.decompress(update) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("skipping rectangle: {e}");
                        continue;
                    }
                }
            } else {
                update.data.clone()
            };

            if let Err(e) = pipeline.buffer().apply_rectangle(update.rect(), &data) {
                warn!("skipping rectangle: {e}");
            }
        }

        self.notifier.send(SessionEvent::DesktopUpdated);
    }

    /// New cursor delivered: convert and cache it.
    ///
    /// A conversion failure drops this cursor update; the previous
    /// cursor stays in effect.
    pub fn on_pointer_new(&self, bitmap: &PointerBitmap) -> Result<PointerHandle, RdviewError> {
        let image = convert_pointer(bitmap, self.pixels.as_ref())?;
        Ok(self.pointers.insert(image))
    }

    /// Cursor released by the engine.
    pub fn on_pointer_free(&self, handle: PointerHandle) {
        if self.pointers.remove(handle).is_none() {
            debug!(handle, "release of unknown pointer handle");
        }
    }

    /// Cursor switched. The record crosses to the presentation
    /// thread, which constructs its native cursor object there.
    pub fn on_pointer_set(&self, handle: PointerHandle) {
        match self.pointers.get(handle) {
            Some(record) => self.notifier.send(SessionEvent::CursorChanged(record)),
            None => warn!(handle, "change to unknown pointer handle"),
        }
    }

    /// A static virtual channel came up.
    pub fn on_channel_connected(&self, name: &str) {
        if name != CLIPBOARD_CHANNEL_NAME {
            debug!(channel = name, "ignoring unknown channel");
            return;
        }
        if !self.config.lock().unwrap().clipboard.enabled {
            return;
        }
        let channel = Arc::new(EngineChannel {
            engine: Arc::clone(&self.engine),
        });
        let bridge = ClipboardBridge::new(channel, Arc::clone(&self.local_clipboard));
        *self.clipboard.lock().unwrap() = Some(Arc::new(bridge));
        debug!("clipboard channel connected");
    }

    /// A static virtual channel went down.
    pub fn on_channel_disconnected(&self, name: &str) {
        if name == CLIPBOARD_CHANNEL_NAME {
            if let Some(bridge) = self.clipboard.lock().unwrap().take() {
                bridge.session_ended();
            }
        }
    }

    /// Raw bytes arrived on a static virtual channel.
    pub fn on_channel_data(&self, name: &str, data: &[u8]) {
        if name != CLIPBOARD_CHANNEL_NAME {
            trace!(channel = name, "dropping data for unknown channel");
            return;
        }
        let bridge = self.clipboard.lock().unwrap().clone();
        let Some(bridge) = bridge else {
            return;
        };
        match bridge.handle_pdu(data) {
            Ok(()) => {}
            Err(e @ RdviewError::Channel(_)) => {
                // Handshake failure: the clipboard goes away, the
                // display session is unaffected.
                warn!("clipboard channel failed: {e}; disabling clipboard sync");
                if let Some(bridge) = self.clipboard.lock().unwrap().take() {
                    bridge.session_ended();
                }
            }
            Err(e) => warn!("clipboard message dropped: {e}"),
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn transition(
        &self,
        apply: impl FnOnce(&mut SessionPhase) -> Result<(), RdviewError>,
    ) -> Result<(), RdviewError> {
        let snapshot = {
            let mut phase = self.phase.lock().unwrap();
            apply(&mut phase)?;
            phase.clone()
        };
        let _ = self.phase_tx.send(snapshot);
        Ok(())
    }

    /// Common terminal path for every way a session can end. The
    /// `Disconnected` notification fires at most once; the first
    /// caller's reason wins.
    fn finish_session(&self, reason: Option<String>) {
        if let Some(bridge) = self.clipboard.lock().unwrap().take() {
            bridge.session_ended();
        }

        {
            let mut phase = self.phase.lock().unwrap();
            if !phase.is_disconnected() {
                phase.force_disconnect();
            }
        }
        let _ = self.phase_tx.send(SessionPhase::Disconnected);

        if !self.disconnect_notified.swap(true, Ordering::SeqCst) {
            info!("session disconnected");
            self.notifier.send(SessionEvent::Disconnected { reason });
        }
    }

    fn map_to_wire(&self, position: Point) -> Option<(u16, u16)> {
        if !self.phase().is_connected() {
            trace!("ignoring pointer event while not connected");
            return None;
        }
        let pipeline = self.screen()?;
        let p = pipeline.map_to_source(position);
        Some((
            p.x.clamp(0, i32::from(u16::MAX)) as u16,
            p.y.clamp(0, i32::from(u16::MAX)) as u16,
        ))
    }
}
