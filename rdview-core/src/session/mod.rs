//! Session lifecycle and orchestration.

pub mod controller;
pub mod events;
pub mod state;

pub use controller::SessionController;
pub use events::{SessionEvent, SessionNotifier, notification_channel};
pub use state::SessionPhase;
