// ── Gateway Atoms: Constants ───────────────────────────────────────────────
// Named constants shared across layers. Values that users may reasonably
// want to change live in GatewayConfig instead.

// ── HTTP server ────────────────────────────────────────────────────────────
pub(crate) const DEFAULT_PORT: u16 = 3000;
pub(crate) const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

// ── Event channel ──────────────────────────────────────────────────────────
// Bounded queue between the transport and the event loop. The webhook handler
// awaits capacity, so a stalled loop applies back-pressure to Evolution.
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Evolution API ──────────────────────────────────────────────────────────
pub(crate) const DEFAULT_EVOLUTION_URL: &str = "http://127.0.0.1:8085";
pub(crate) const DEFAULT_INSTANCE_NAME: &str = "wa-gateway";
pub(crate) const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 30;
pub(crate) const TRANSPORT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const CONNECTION_POLL_INTERVAL_SECS: u64 = 5;
/// WhatsApp has no hard limit, but very long texts are split.
pub(crate) const MAX_TEXT_CHUNK: usize = 4000;

// ── QR page ────────────────────────────────────────────────────────────────
pub(crate) const QR_PAGE_REFRESH_MS: u64 = 5000;
pub(crate) const QR_MIN_DIMENSION: u32 = 256;
