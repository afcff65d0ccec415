// WhatsApp Gateway — Session State Machine
// SessionMachine (state + QR bootstrap cache), transition table, forced logout

use super::transport::TransportEvent;
use crate::atoms::types::{BootstrapArtifact, SessionState};
use log::{debug, info};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct SessionInner {
    state: SessionState,
    artifact: Option<BootstrapArtifact>,
}

/// Consistent view of state and cached QR, taken under one read lock.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub artifact: Option<BootstrapArtifact>,
}

/// Result of feeding one event to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved { from: SessionState, to: SessionState },
    /// Edge back into the same state (repeated `qr`).
    Stayed(SessionState),
    /// No outgoing edge for this event; nothing changed.
    Ignored(SessionState),
}

/// Owner of the process-wide session state. All writes go through `apply`
/// or `force_disconnect`, serialized by the write lock.
#[derive(Debug, Default)]
pub struct SessionMachine {
    inner: RwLock<SessionInner>,
}

/// Pure transition table. `None` means the event has no edge from `state`.
pub fn next_state(state: SessionState, event: &TransportEvent) -> Option<SessionState> {
    use SessionState::*;
    match (state, event) {
        (Uninitialized | QrPending | Disconnected, TransportEvent::Qr(_)) => Some(QrPending),
        (QrPending, TransportEvent::Authenticated) => Some(Authenticated),
        (Authenticated, TransportEvent::Ready) => Some(Ready),
        (QrPending | Authenticated | Ready, TransportEvent::Disconnected) => Some(Disconnected),
        _ => None,
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    /// Last QR issued, regardless of whether it is still valid.
    pub fn artifact(&self) -> Option<BootstrapArtifact> {
        self.inner.read().artifact.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();
        SessionSnapshot {
            state: inner.state,
            artifact: inner.artifact.clone(),
        }
    }

    /// Apply one lifecycle event. `Message` events never change state.
    pub fn apply(&self, event: &TransportEvent) -> Transition {
        let mut inner = self.inner.write();
        let from = inner.state;

        let Some(to) = next_state(from, event) else {
            debug!("[session] Ignored '{}' event in state {}", event.kind(), from);
            return Transition::Ignored(from);
        };

        if let TransportEvent::Qr(code) = event {
            inner.artifact = Some(BootstrapArtifact::new(code.as_str()));
        }
        inner.state = to;

        if from == to {
            debug!("[session] QR code reissued");
            Transition::Stayed(to)
        } else {
            info!("[session] {} -> {} on '{}'", from, to, event.kind());
            Transition::Moved { from, to }
        }
    }

    /// Caller-initiated logout: drop to `DISCONNECTED` without waiting for
    /// the transport's own event. Only a logged-in session can be logged
    /// out; otherwise the current state is returned as the error.
    pub fn force_disconnect(&self) -> Result<SessionState, SessionState> {
        let mut inner = self.inner.write();
        let from = inner.state;
        if !from.is_logged_in() {
            return Err(from);
        }
        inner.state = SessionState::Disconnected;
        info!("[session] {} -> DISCONNECTED on logout", from);
        Ok(from)
    }
}
