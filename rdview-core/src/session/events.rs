//! Presentation-thread notifications.
//!
//! All presentation-visible state changes cross the thread boundary
//! through one FIFO queue; the presentation side never has objects
//! constructed into it from the processing thread. Sends never block:
//! the queue is an unbounded `mpsc` whose depth stays small because
//! desktop updates are coalesced to one notification per callback
//! batch and cursor/lifecycle events are rare.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::cursor::CursorImage;

// ── SessionEvent ─────────────────────────────────────────────────

/// A notification delivered to the presentation thread, in send
/// order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Negotiation is starting.
    AboutToConnect,
    /// Desktop geometry is final; the screen buffer exists.
    Connected,
    /// The session ended. Carries the failure reason when the end was
    /// not a clean stop. Delivered exactly once per session.
    Disconnected { reason: Option<String> },
    /// New rectangle updates landed in the desktop buffer; one per
    /// callback batch.
    DesktopUpdated,
    /// The remote cursor changed. The presentation side constructs
    /// its native cursor object from the carried record.
    CursorChanged(Arc<CursorImage>),
}

// ── SessionNotifier ──────────────────────────────────────────────

/// Sender half of the notification queue.
#[derive(Clone)]
pub struct SessionNotifier {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionNotifier {
    /// Enqueue an event. Never blocks; a dropped receiver (the
    /// presentation layer went away) is not an error.
    pub fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            trace!("presentation receiver dropped; notification discarded");
        }
    }
}

/// Create the notification queue.
pub fn notification_channel() -> (SessionNotifier, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionNotifier { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_send_order() {
        let (notifier, mut rx) = notification_channel();
        notifier.send(SessionEvent::AboutToConnect);
        notifier.send(SessionEvent::Connected);
        notifier.send(SessionEvent::DesktopUpdated);

        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::AboutToConnect));
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::Connected));
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::DesktopUpdated));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_after_receiver_drop_is_harmless() {
        let (notifier, rx) = notification_channel();
        drop(rx);
        notifier.send(SessionEvent::DesktopUpdated);
    }
}
