// ── Gateway Atoms: Pure Data Types ─────────────────────────────────────────
// Session lifecycle enum, bootstrap artifact, and the send-gate threshold.
// No I/O, no locks — the engine layer owns the mutable instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Session State ──────────────────────────────────────────────────────────

/// Lifecycle of the single external session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Uninitialized,
    QrPending,
    Authenticated,
    Ready,
    Disconnected,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::QrPending => "QR_PENDING",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Ready => "READY",
            SessionState::Disconnected => "DISCONNECTED",
        }
    }

    /// `AUTHENTICATED` or `READY`: the transport holds valid credentials.
    pub fn is_logged_in(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Bootstrap Artifact ─────────────────────────────────────────────────────

/// Most recent login QR issued by the transport. Either a `data:` URL
/// (Evolution API) or the raw code string to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapArtifact {
    pub encoded_image: String,
    pub issued_at: DateTime<Utc>,
}

impl BootstrapArtifact {
    pub fn new(encoded_image: impl Into<String>) -> Self {
        BootstrapArtifact {
            encoded_image: encoded_image.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn is_data_url(&self) -> bool {
        self.encoded_image.starts_with("data:")
    }
}

// ── Send Gate ──────────────────────────────────────────────────────────────

/// Minimum session state that admits send/fetch commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendGate {
    /// Only `READY`.
    #[default]
    Ready,
    /// `AUTHENTICATED` or `READY`.
    Authenticated,
}

impl SendGate {
    pub fn admits(self, state: SessionState) -> bool {
        match self {
            SendGate::Ready => state == SessionState::Ready,
            SendGate::Authenticated => state.is_logged_in(),
        }
    }
}
