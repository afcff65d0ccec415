// WhatsApp Gateway — Facade
// Gateway: the single entry point HTTP handlers and the auto-reply engine
// call. Every command reads the session state first, then talks to the
// transport with no lock held.

use super::state::SessionMachine;
use super::transport::{
    Chat, DeliveryReceipt, Message, OutboundMessageRequest, SessionTransport,
};
use crate::atoms::error::{GatewayError, GatewayResult};
use crate::atoms::types::{BootstrapArtifact, SendGate, SessionState};
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What `/qr` can show right now.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapView {
    Available(BootstrapArtifact),
    /// No QR issued yet; poll again.
    NotYetAvailable,
    /// Session already logged in; any cached QR is stale.
    AlreadyAuthenticated,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub status: SessionState,
    pub messages_sent: u64,
    pub messages_received: u64,
}

pub struct Gateway {
    machine: Arc<SessionMachine>,
    transport: Arc<dyn SessionTransport>,
    gate: SendGate,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl Gateway {
    pub fn new(machine: Arc<SessionMachine>, transport: Arc<dyn SessionTransport>, gate: SendGate) -> Self {
        Gateway {
            machine,
            transport,
            gate,
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    pub fn machine(&self) -> &Arc<SessionMachine> {
        &self.machine
    }

    // ── Queries ────────────────────────────────────────────────────────────

    pub fn status(&self) -> SessionState {
        self.machine.state()
    }

    /// Never waits for a QR; callers poll. The cached code is only served
    /// in `QR_PENDING`: once a session has logged in, that code is spent,
    /// and after a disconnect the next `qr` event brings a fresh one.
    pub fn bootstrap_artifact(&self) -> BootstrapView {
        let snap = self.machine.snapshot();
        match (snap.state, snap.artifact) {
            (state, _) if state.is_logged_in() => BootstrapView::AlreadyAuthenticated,
            (SessionState::QrPending, Some(artifact)) => BootstrapView::Available(artifact),
            _ => BootstrapView::NotYetAvailable,
        }
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            status: self.status(),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_inbound(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    // ── Gated commands ─────────────────────────────────────────────────────

    /// Read the state once and check it against the send gate. The state
    /// may still change before the transport call lands; that window is
    /// accepted.
    fn ensure_sendable(&self) -> GatewayResult<SessionState> {
        let state = self.machine.state();
        if self.gate.admits(state) {
            Ok(state)
        } else {
            Err(GatewayError::not_authenticated(state))
        }
    }

    pub async fn send_message(&self, recipient: &str, body: &str) -> GatewayResult<DeliveryReceipt> {
        self.ensure_sendable()?;
        let request = OutboundMessageRequest::text(recipient, body)?;
        self.dispatch(request).await
    }

    pub async fn send_media(
        &self,
        recipient: &str,
        media_url: Option<&str>,
        media_type: Option<&str>,
        caption: Option<&str>,
    ) -> GatewayResult<DeliveryReceipt> {
        self.ensure_sendable()?;
        let request = OutboundMessageRequest::media(recipient, media_url, media_type, caption)?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: OutboundMessageRequest) -> GatewayResult<DeliveryReceipt> {
        let receipt = self.transport.send(&request.recipient, &request.payload).await?;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        info!("[gateway] Sent to {} (id {:?})", request.recipient, receipt.id);
        Ok(receipt)
    }

    pub async fn list_chats(&self) -> GatewayResult<Vec<Chat>> {
        self.ensure_sendable()?;
        let chats = self.transport.fetch_chats().await.map_err(as_fetch_error)?;
        Ok(chats.into_iter().filter(|c| c.id().is_some()).collect())
    }

    pub async fn list_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>> {
        self.ensure_sendable()?;
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(GatewayError::InvalidRecipient("chat id is empty".into()));
        }
        self.transport.fetch_messages(chat_id).await.map_err(as_fetch_error)
    }

    /// Forces `DISCONNECTED` before the transport call so no request can see
    /// a ready session mid-logout.
    pub async fn logout(&self) -> GatewayResult<()> {
        let previous = self
            .machine
            .force_disconnect()
            .map_err(GatewayError::not_authenticated)?;
        info!("[gateway] Logout requested (was {})", previous);
        if let Err(e) = self.transport.logout().await {
            warn!("[gateway] Transport logout failed: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Fetch failures surface as `TransportFetch` whatever the transport chose.
fn as_fetch_error(e: GatewayError) -> GatewayError {
    match e {
        GatewayError::TransportFetch(_) | GatewayError::NotAuthenticated { .. } => e,
        other => GatewayError::TransportFetch(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::whatsapp::transport::{OutboundPayload, TransportEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        sends: Mutex<Vec<(String, OutboundPayload)>>,
        logouts: AtomicU64,
        fail_fetch: bool,
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn initialize(&self) -> GatewayResult<()> {
            Ok(())
        }

        async fn send(&self, recipient: &str, payload: &OutboundPayload) -> GatewayResult<DeliveryReceipt> {
            self.sends.lock().push((recipient.to_string(), payload.clone()));
            Ok(DeliveryReceipt {
                id: Some("MSG1".into()),
                recipient: recipient.to_string(),
                status: Some("PENDING".into()),
                sent_at: chrono::Utc::now(),
                raw: serde_json::Value::Null,
            })
        }

        async fn fetch_chats(&self) -> GatewayResult<Vec<Chat>> {
            if self.fail_fetch {
                return Err(GatewayError::TransportSend("socket closed".into()));
            }
            Ok(vec![
                Chat(serde_json::json!({ "id": "1@s.whatsapp.net" })),
                Chat(serde_json::json!({ "name": "no id" })),
            ])
        }

        async fn fetch_messages(&self, _chat_id: &str) -> GatewayResult<Vec<Message>> {
            Ok(vec![Message(serde_json::json!({ "key": { "id": "M1" } }))])
        }

        async fn logout(&self) -> GatewayResult<()> {
            self.logouts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn gateway_in(events: &[TransportEvent], gate: SendGate) -> (Gateway, Arc<FakeTransport>) {
        let machine = Arc::new(SessionMachine::new());
        for e in events {
            machine.apply(e);
        }
        let transport = Arc::new(FakeTransport::default());
        (Gateway::new(machine, transport.clone(), gate), transport)
    }

    fn ready_events() -> Vec<TransportEvent> {
        vec![
            TransportEvent::Qr("A".into()),
            TransportEvent::Authenticated,
            TransportEvent::Ready,
        ]
    }

    #[test]
    fn bootstrap_view_tracks_state() {
        let (gw, _) = gateway_in(&[], SendGate::Ready);
        assert_eq!(gw.bootstrap_artifact(), BootstrapView::NotYetAvailable);
        gw.machine().apply(&TransportEvent::Qr("A".into()));
        match gw.bootstrap_artifact() {
            BootstrapView::Available(a) => assert_eq!(a.encoded_image, "A"),
            other => panic!("unexpected {:?}", other),
        }
        gw.machine().apply(&TransportEvent::Authenticated);
        assert_eq!(gw.bootstrap_artifact(), BootstrapView::AlreadyAuthenticated);
    }

    #[test]
    fn spent_code_not_served_after_disconnect() {
        let mut events = ready_events();
        events.push(TransportEvent::Disconnected);
        let (gw, _) = gateway_in(&events, SendGate::Ready);
        assert_eq!(gw.status(), SessionState::Disconnected);
        assert_eq!(gw.bootstrap_artifact(), BootstrapView::NotYetAvailable);

        gw.machine().apply(&TransportEvent::Qr("FRESH".into()));
        match gw.bootstrap_artifact() {
            BootstrapView::Available(a) => assert_eq!(a.encoded_image, "FRESH"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn spent_code_not_served_after_logout() {
        let (gw, _) = gateway_in(&ready_events(), SendGate::Ready);
        gw.logout().await.unwrap();
        assert_eq!(gw.bootstrap_artifact(), BootstrapView::NotYetAvailable);
    }

    #[tokio::test]
    async fn send_blocked_before_ready() {
        for events in [vec![], vec![TransportEvent::Qr("A".into())]] {
            let (gw, transport) = gateway_in(&events, SendGate::Ready);
            let err = gw.send_message("628123", "hi").await.unwrap_err();
            assert!(matches!(err, GatewayError::NotAuthenticated { .. }));
            assert!(transport.sends.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn authenticated_gate_admits_authenticated() {
        let events = [TransportEvent::Qr("A".into()), TransportEvent::Authenticated];
        let (strict, _) = gateway_in(&events, SendGate::Ready);
        assert!(strict.send_message("628123", "hi").await.is_err());
        let (lenient, transport) = gateway_in(&events, SendGate::Authenticated);
        assert!(lenient.send_message("628123", "hi").await.is_ok());
        assert_eq!(transport.sends.lock().len(), 1);
    }

    #[tokio::test]
    async fn send_counts_successes() {
        let (gw, transport) = gateway_in(&ready_events(), SendGate::Ready);
        let receipt = gw.send_message("628123", "hi").await.unwrap();
        assert_eq!(receipt.id.as_deref(), Some("MSG1"));
        assert_eq!(gw.stats().messages_sent, 1);
        let sends = transport.sends.lock();
        assert_eq!(sends[0], ("628123".to_string(), OutboundPayload::Text("hi".into())));
    }

    #[tokio::test]
    async fn send_media_needs_url_and_session() {
        let (gw, _) = gateway_in(&[], SendGate::Ready);
        let err = gw.send_media("628123", None, None, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated { .. }));

        let (gw, transport) = gateway_in(&ready_events(), SendGate::Ready);
        let err = gw.send_media("628123", None, None, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingMediaReference));
        assert!(transport.sends.lock().is_empty());

        gw.send_media("628123", Some("https://x/a.png"), None, Some("pic")).await.unwrap();
        assert_eq!(transport.sends.lock().len(), 1);
    }

    #[tokio::test]
    async fn list_chats_drops_entries_without_id() {
        let (gw, _) = gateway_in(&ready_events(), SendGate::Ready);
        let chats = gw.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        let messages = gw.list_messages("1@s.whatsapp.net").await.unwrap();
        assert_eq!(messages[0].id(), Some("M1"));
    }

    #[tokio::test]
    async fn fetch_failures_become_fetch_errors() {
        let machine = Arc::new(SessionMachine::new());
        for e in ready_events() {
            machine.apply(&e);
        }
        let transport = Arc::new(FakeTransport { fail_fetch: true, ..Default::default() });
        let gw = Gateway::new(machine, transport, SendGate::Ready);
        let err = gw.list_chats().await.unwrap_err();
        assert!(matches!(err, GatewayError::TransportFetch(_)));
    }

    #[tokio::test]
    async fn logout_forces_disconnected() {
        let (gw, transport) = gateway_in(&ready_events(), SendGate::Ready);
        gw.logout().await.unwrap();
        assert_eq!(gw.status(), SessionState::Disconnected);
        assert_eq!(transport.logouts.load(Ordering::Relaxed), 1);

        let err = gw.logout().await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated { state: SessionState::Disconnected }));
        assert_eq!(transport.logouts.load(Ordering::Relaxed), 1);
    }
}
