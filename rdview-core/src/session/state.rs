//! Session lifecycle state machine.
//!
//! Models the full lifecycle of one connection attempt, with
//! validated transitions that return `Result` instead of panicking.

use std::time::Instant;

use crate::error::RdviewError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a session.
///
/// ```text
///  Idle ──► Connecting ──► Negotiating ──► Connected
///              │                │              │
///              ▼                ▼              ▼
///           Disconnecting ◄─────┴──────────────┘
///              │
///              ▼
///           Disconnected
/// ```
///
/// `Disconnected` is terminal: a new connect attempt starts with a
/// fresh session in `Idle`; phases and handles are never reused.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionPhase {
    /// No connection attempted yet. Initial state.
    #[default]
    Idle,

    /// Connect requested; the transport is being established.
    Connecting,

    /// Transport is up; negotiating capabilities and geometry.
    Negotiating,

    /// Negotiation complete; desktop geometry is final and update
    /// traffic flows.
    Connected {
        /// When the session entered the `Connected` state.
        since: Instant,
    },

    /// Shutdown in progress; outstanding work being cancelled.
    Disconnecting,

    /// Terminal state.
    Disconnected,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

impl SessionPhase {
    /// Returns `true` when update traffic may flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` once the session has terminated.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` while a connection attempt or session is live.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Disconnected)
    }

    /// How long the session has been in the `Connected` state.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_connect(&mut self) -> Result<(), RdviewError> {
        match self {
            Self::Idle => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(RdviewError::ProtocolViolation(
                "cannot connect: session already used",
            )),
        }
    }

    /// Transition to `Negotiating`.
    ///
    /// Valid from: `Connecting`.
    pub fn begin_negotiation(&mut self) -> Result<(), RdviewError> {
        match self {
            Self::Connecting => {
                *self = Self::Negotiating;
                Ok(())
            }
            _ => Err(RdviewError::ProtocolViolation(
                "cannot negotiate: not in Connecting state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Negotiating`.
    pub fn complete_negotiation(&mut self) -> Result<(), RdviewError> {
        match self {
            Self::Negotiating => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(RdviewError::ProtocolViolation(
                "cannot complete negotiation: not in Negotiating state",
            )),
        }
    }

    /// Transition to `Disconnecting`.
    ///
    /// Valid from: `Connecting`, `Negotiating`, `Connected`.
    pub fn begin_disconnect(&mut self) -> Result<(), RdviewError> {
        match self {
            Self::Connecting | Self::Negotiating | Self::Connected { .. } => {
                *self = Self::Disconnecting;
                Ok(())
            }
            _ => Err(RdviewError::ProtocolViolation(
                "cannot disconnect: no live connection",
            )),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Disconnecting`, and directly from `Connecting` /
    /// `Negotiating` on failure.
    pub fn finish_disconnect(&mut self) -> Result<(), RdviewError> {
        match self {
            Self::Disconnecting | Self::Connecting | Self::Negotiating => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(RdviewError::ProtocolViolation(
                "cannot finish disconnect: not in a disconnectable state",
            )),
        }
    }

    /// Force-terminate regardless of current state. Used for
    /// unrecoverable failures where the path no longer matters.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::Idle;

        phase.begin_connect().unwrap();
        assert_eq!(phase, SessionPhase::Connecting);

        phase.begin_negotiation().unwrap();
        assert_eq!(phase, SessionPhase::Negotiating);

        phase.complete_negotiation().unwrap();
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());

        phase.begin_disconnect().unwrap();
        assert_eq!(phase, SessionPhase::Disconnecting);

        phase.finish_disconnect().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn sessions_are_single_use() {
        let mut phase = SessionPhase::Disconnected;
        assert!(phase.begin_connect().is_err());
    }

    #[test]
    fn invalid_transition_negotiate_from_idle() {
        let mut phase = SessionPhase::Idle;
        assert!(phase.begin_negotiation().is_err());
    }

    #[test]
    fn invalid_transition_complete_from_connecting() {
        let mut phase = SessionPhase::Connecting;
        assert!(phase.complete_negotiation().is_err());
    }

    #[test]
    fn failure_during_negotiation_goes_straight_down() {
        let mut phase = SessionPhase::Negotiating;
        phase.finish_disconnect().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn disconnect_from_negotiating() {
        let mut phase = SessionPhase::Negotiating;
        phase.begin_disconnect().unwrap();
        phase.finish_disconnect().unwrap();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn force_disconnect_from_any_state() {
        let mut phase = SessionPhase::Connected {
            since: Instant::now(),
        };
        phase.force_disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn activity_flags() {
        assert!(!SessionPhase::Idle.is_active());
        assert!(SessionPhase::Connecting.is_active());
        assert!(SessionPhase::Disconnecting.is_active());
        assert!(!SessionPhase::Disconnected.is_active());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Idle.to_string(), "Idle");
        assert_eq!(SessionPhase::Negotiating.to_string(), "Negotiating");
        assert_eq!(
            SessionPhase::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
    }
}
