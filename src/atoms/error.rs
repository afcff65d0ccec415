// ── Gateway Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the gateway, built with `thiserror`.
//
// Design rules:
//   • Session/transport variants mirror the failure taxonomy callers act on:
//     gating, transport, and caller-input failures.
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries secret material (API keys, instance tokens) in its message.

use crate::atoms::types::SessionState;
use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Operation attempted while the session is below the required state.
    /// Recoverable: the caller retries after the QR bootstrap completes.
    #[error("Client is not authenticated (session is {state})")]
    NotAuthenticated { state: SessionState },

    /// The transport could not start its channel.
    #[error("Transport init failed: {0}")]
    TransportInit(String),

    /// Network/channel failure while sending.
    #[error("Transport send failed: {0}")]
    TransportSend(String),

    /// Network/channel failure while fetching chats or messages.
    #[error("Transport fetch failed: {0}")]
    TransportFetch(String),

    /// Recipient identifier is malformed or not on the network.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Media send attempted without a media URL.
    #[error("Missing media reference")]
    MissingMediaReference,

    /// Gateway configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer) outside a classified operation.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// TOML config file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl GatewayError {
    pub fn not_authenticated(state: SessionState) -> Self {
        Self::NotAuthenticated { state }
    }

    /// True for failures caused by the caller's input or the session not being
    /// ready, as opposed to the transport misbehaving.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated { .. } | Self::InvalidRecipient(_) | Self::MissingMediaReference
        )
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All gateway operations return this type.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<GatewayError> for String {
    fn from(e: GatewayError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_authenticated_names_the_state() {
        let err = GatewayError::not_authenticated(SessionState::QrPending);
        assert_eq!(err.to_string(), "Client is not authenticated (session is QR_PENDING)");
        assert!(err.is_client_error());
    }

    #[test]
    fn transport_errors_are_not_client_errors() {
        assert!(!GatewayError::TransportSend("boom".into()).is_client_error());
        assert!(!GatewayError::TransportFetch("boom".into()).is_client_error());
        assert!(GatewayError::MissingMediaReference.is_client_error());
    }

    #[test]
    fn converts_into_string() {
        let s: String = GatewayError::InvalidRecipient("abc".into()).into();
        assert_eq!(s, "Invalid recipient: abc");
    }
}
