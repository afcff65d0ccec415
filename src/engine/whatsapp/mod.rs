// WhatsApp Gateway — Session Core (Evolution API transport)
//
// Module layout:
//   transport     — SessionTransport trait, TransportEvent, OutboundPayload,
//                   DeliveryReceipt, Chat / Message, IncomingMessage
//   state         — SessionMachine, transition table, force_disconnect
//   gateway       — Gateway facade, BootstrapView, GatewayStats
//   messages      — AutoReplyRule, compile_rules, AutoReplyEngine
//   config        — GatewayConfig, EvolutionConfig, AutoReplyConfig, load_config
//   bridge        — event_channel, run_event_loop, Bridge::start / initialize
//   evolution_api — EvolutionTransport (create/delete instance, sendText,
//                   sendMedia, findChats, findMessages, logout)
//   webhook       — parse_webhook_event (Evolution webhook → TransportEvent)
//   qr            — render_qr_page

pub mod transport;
pub mod state;
pub mod gateway;
pub mod messages;
pub mod config;
pub mod bridge;
pub mod evolution_api;
pub mod webhook;
pub mod qr;

// ── Re-exports ─────────────────────────────────────────────────────────

pub use bridge::{event_channel, Bridge};
pub use config::{load_config, GatewayConfig};
pub use evolution_api::EvolutionTransport;
pub use gateway::{BootstrapView, Gateway, GatewayStats};
pub use messages::AutoReplyEngine;
pub use state::SessionMachine;
pub use transport::{
    Chat, DeliveryReceipt, IncomingMessage, Message, OutboundPayload, SessionTransport, TransportEvent,
};
