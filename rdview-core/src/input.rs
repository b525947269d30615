//! Input translation — presentation events to protocol wire flags.
//!
//! Mouse buttons and wheel rotation map onto the protocol's pointer
//! flag word; keyboard events travel as scancodes with release and
//! extended-key flags. [`ModifierTracker`] keeps enough bookkeeping
//! to recover from modifier keys left pressed when the presentation
//! surface loses focus mid-chord.

use std::collections::HashSet;

use bitflags::bitflags;

bitflags! {
    /// Pointer event flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PointerFlags: u16 {
        /// 9-bit wheel rotation magnitude field.
        const WHEEL_ROTATION_MASK = 0x01FF;
        const WHEEL_NEGATIVE = 0x0100;
        const WHEEL = 0x0200;
        const MOVE = 0x0800;
        const BUTTON1 = 0x1000;
        const BUTTON2 = 0x2000;
        const BUTTON3 = 0x4000;
        const DOWN = 0x8000;
    }
}

bitflags! {
    /// Keyboard event flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyboardFlags: u16 {
        /// Scancode carries the 0xE0 extended prefix.
        const EXTENDED = 0x0100;
        const RELEASE = 0x8000;
    }
}

// ── Mouse ────────────────────────────────────────────────────────

/// Mouse buttons the protocol can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// The button's pointer flag.
    pub fn flags(self) -> PointerFlags {
        match self {
            MouseButton::Left => PointerFlags::BUTTON1,
            MouseButton::Right => PointerFlags::BUTTON2,
            MouseButton::Middle => PointerFlags::BUTTON3,
        }
    }
}

/// Flag word for a wheel rotation.
///
/// The magnitude is clamped to the 8-bit rotation field; downward
/// rotation sets the negative flag.
pub fn wheel_flags(delta: i16) -> PointerFlags {
    let magnitude = u16::from(delta.unsigned_abs().min(0xFF) as u8);
    let mut flags = PointerFlags::WHEEL | PointerFlags::from_bits_retain(magnitude);
    if delta < 0 {
        flags |= PointerFlags::WHEEL_NEGATIVE;
    }
    flags
}

/// Flag word for a keyboard scancode event.
///
/// Scancodes carry the extended prefix as bit 8; the wire flag word
/// mirrors it so the engine can emit the 0xE0 prefix.
pub fn key_flags(scancode: u16, pressed: bool) -> KeyboardFlags {
    let mut flags = KeyboardFlags::empty();
    if !pressed {
        flags |= KeyboardFlags::RELEASE;
    }
    if scancode & EXTENDED_BIT != 0 {
        flags |= KeyboardFlags::EXTENDED;
    }
    flags
}

// ── Keyboard modifiers ───────────────────────────────────────────

/// Extended-prefix bit carried inside our 16-bit scancode values.
const EXTENDED_BIT: u16 = 0x0100;

const SC_LSHIFT: u16 = 0x2A;
const SC_RSHIFT: u16 = 0x36;
const SC_LCTRL: u16 = 0x1D;
const SC_RCTRL: u16 = EXTENDED_BIT | 0x1D;
const SC_LALT: u16 = 0x38;
const SC_ALTGR: u16 = EXTENDED_BIT | 0x38;
const SC_LMETA: u16 = EXTENDED_BIT | 0x5B;
const SC_RMETA: u16 = EXTENDED_BIT | 0x5C;

/// Logical modifier keys, independent of any UI toolkit's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyModifier {
    Shift,
    Control,
    Alt,
    AltGr,
    Meta,
}

impl KeyModifier {
    /// Classify a scancode (with the extended bit folded in).
    pub fn from_scancode(scancode: u16) -> Option<Self> {
        match scancode {
            SC_LSHIFT | SC_RSHIFT => Some(KeyModifier::Shift),
            SC_LCTRL | SC_RCTRL => Some(KeyModifier::Control),
            SC_LALT => Some(KeyModifier::Alt),
            SC_ALTGR => Some(KeyModifier::AltGr),
            SC_LMETA | SC_RMETA => Some(KeyModifier::Meta),
            _ => None,
        }
    }

    /// Scancodes to release for this modifier. Both left and right
    /// variants are released — the remote side cannot tell which one
    /// was left hanging.
    pub fn release_scancodes(self) -> &'static [u16] {
        match self {
            KeyModifier::Shift => &[SC_LSHIFT, SC_RSHIFT],
            KeyModifier::Control => &[SC_LCTRL, SC_RCTRL],
            KeyModifier::Alt => &[SC_LALT],
            KeyModifier::AltGr => &[SC_ALTGR],
            KeyModifier::Meta => &[SC_LMETA, SC_RMETA],
        }
    }
}

// ── ModifierTracker ──────────────────────────────────────────────

/// What to inject after the presentation surface loses focus.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FocusLossRecovery {
    /// The last key event was a press; send the keyboard-pause
    /// sequence so the remote side stops auto-repeating it.
    pub send_pause: bool,
    /// Release scancodes for every modifier still held.
    pub release_scancodes: Vec<u16>,
}

/// Tracks held modifier keys and whether the most recent key event
/// was a press.
#[derive(Debug, Default)]
pub struct ModifierTracker {
    held: HashSet<KeyModifier>,
    last_was_press: bool,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key event on its way to the engine.
    pub fn note_key(&mut self, scancode: u16, pressed: bool) {
        self.last_was_press = pressed;
        if let Some(modifier) = KeyModifier::from_scancode(scancode) {
            if pressed {
                self.held.insert(modifier);
            } else {
                self.held.remove(&modifier);
            }
        }
    }

    /// Consume the tracked state when focus is lost.
    pub fn drain_for_focus_loss(&mut self) -> FocusLossRecovery {
        let send_pause = self.last_was_press;
        self.last_was_press = false;

        let mut release_scancodes = Vec::new();
        let mut held: Vec<KeyModifier> = self.held.drain().collect();
        held.sort_by_key(|m| *m as u8);
        for modifier in held {
            release_scancodes.extend_from_slice(modifier.release_scancodes());
        }

        FocusLossRecovery {
            send_pause,
            release_scancodes,
        }
    }
}
