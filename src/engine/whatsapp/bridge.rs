// WhatsApp Gateway — Core Bridge Lifecycle
// event_channel, process_event, run_event_loop, Bridge::start / initialize

use super::gateway::Gateway;
use super::messages::AutoReplyEngine;
use super::state::{SessionMachine, Transition};
use super::transport::{EventReceiver, EventSender, SessionTransport, TransportEvent};
use crate::atoms::error::GatewayResult;
use crate::atoms::types::{SendGate, SessionState};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bounded queue from the transport into the event loop.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Handle one transport event. Lifecycle events are applied inline, in
/// order; messages go to a spawned auto-reply task so a slow send never
/// stalls the loop. The spawned handle is returned for callers that need
/// to wait on it.
pub fn process_event(
    gateway: &Arc<Gateway>,
    auto_reply: &Arc<AutoReplyEngine>,
    event: TransportEvent,
) -> Option<JoinHandle<()>> {
    match event {
        TransportEvent::Message(msg) => {
            let gw = gateway.clone();
            let engine = auto_reply.clone();
            Some(tokio::spawn(async move {
                engine.handle_inbound_message(&gw, msg).await;
            }))
        }
        lifecycle => {
            if let Transition::Moved { to, .. } = gateway.machine().apply(&lifecycle) {
                if to == SessionState::Ready {
                    info!("[bridge] Session ready, accepting sends");
                }
            }
            None
        }
    }
}

/// The single writer of session state. Runs until every sender is dropped.
pub async fn run_event_loop(mut rx: EventReceiver, gateway: Arc<Gateway>, auto_reply: Arc<AutoReplyEngine>) {
    info!("[bridge] Event loop started");
    while let Some(event) = rx.recv().await {
        process_event(&gateway, &auto_reply, event);
    }
    info!("[bridge] Event channel closed, loop stopped");
}

// ── Bridge ─────────────────────────────────────────────────────────────────

/// Running gateway core: facade, event sender for webhook handlers, and the
/// event loop task.
pub struct Bridge {
    pub gateway: Arc<Gateway>,
    pub events: EventSender,
    transport: Arc<dyn SessionTransport>,
    loop_handle: JoinHandle<()>,
}

impl Bridge {
    /// Wire the state machine, facade and auto-reply engine around
    /// `transport` and spawn the event loop reading `rx`.
    pub fn start(
        transport: Arc<dyn SessionTransport>,
        events: EventSender,
        rx: EventReceiver,
        gate: SendGate,
        auto_reply: AutoReplyEngine,
    ) -> Self {
        let machine = Arc::new(SessionMachine::new());
        let gateway = Arc::new(Gateway::new(machine, transport.clone(), gate));
        info!(
            "[bridge] Starting (send gate: {:?}, {} auto-reply rules)",
            gate,
            auto_reply.rules().len()
        );
        let loop_handle = tokio::spawn(run_event_loop(rx, gateway.clone(), Arc::new(auto_reply)));
        Bridge { gateway, events, transport, loop_handle }
    }

    /// Start the transport channel. Failure leaves the gateway up in
    /// `UNINITIALIZED`; whether that is fatal is the caller's decision.
    pub async fn initialize(&self) -> GatewayResult<()> {
        match self.transport.initialize().await {
            Ok(()) => {
                info!("[bridge] Transport initialized");
                Ok(())
            }
            Err(e) => {
                error!("[bridge] Transport initialization failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn shutdown(self) {
        drop(self.events);
        if !self.loop_handle.is_finished() {
            warn!("[bridge] Aborting event loop");
            self.loop_handle.abort();
        }
    }
}
