// WhatsApp Gateway — Configuration
// GatewayConfig, EvolutionConfig, AutoReplyConfig, load_config

use crate::atoms::constants::*;
use crate::atoms::error::{GatewayError, GatewayResult};
use crate::atoms::types::SendGate;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Config Structs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind — "0.0.0.0" (all interfaces) or "127.0.0.1"
    pub bind_address: String,
    pub port: u16,
    /// "ready" | "authenticated"
    pub send_gate: SendGate,
    /// Capacity of the transport → event loop queue
    pub event_channel_capacity: usize,
    pub evolution: EvolutionConfig,
    pub auto_reply: AutoReplyConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_address: DEFAULT_BIND_ADDRESS.into(),
            port: DEFAULT_PORT,
            send_gate: SendGate::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            evolution: EvolutionConfig::default(),
            auto_reply: AutoReplyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Evolution API base URL
    pub api_url: String,
    /// Evolution global API key
    pub api_key: String,
    /// Instance name (default: "wa-gateway")
    pub instance_name: String,
    /// URL Evolution should POST webhooks to. Empty = derived from bind port.
    pub webhook_url: String,
    /// Shared secret appended to the webhook URL as `?token=`. Empty = one
    /// is generated at startup.
    pub webhook_token: String,
    /// Per-request deadline for Evolution calls
    pub timeout_secs: u64,
    /// Poll connectionState in the background (covers unreachable webhooks)
    pub poll_connection: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            api_url: DEFAULT_EVOLUTION_URL.into(),
            api_key: String::new(),
            instance_name: DEFAULT_INSTANCE_NAME.into(),
            webhook_url: String::new(),
            webhook_token: String::new(),
            timeout_secs: DEFAULT_TRANSPORT_TIMEOUT_SECS,
            poll_connection: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    /// Whether to auto-reply inside group chats
    pub respond_in_groups: bool,
    /// Evaluated top to bottom, first match wins
    pub rules: Vec<RuleConfig>,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        AutoReplyConfig {
            enabled: true,
            respond_in_groups: false,
            rules: vec![
                RuleConfig::exact("Hi", "Hello!"),
                RuleConfig::exact("How are you?", "I am fine, thank you!"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    Contains,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub response: String,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
}

impl RuleConfig {
    pub fn exact(pattern: &str, response: &str) -> Self {
        RuleConfig {
            pattern: pattern.into(),
            response: response.into(),
            match_kind: MatchKind::Exact,
        }
    }
}

// ── Loading ────────────────────────────────────────────────────────────────

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> GatewayResult<Self> {
        let config: GatewayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(GatewayError::Config("event_channel_capacity must be > 0".into()));
        }
        if self.evolution.instance_name.trim().is_empty() {
            return Err(GatewayError::Config("evolution.instance_name is empty".into()));
        }
        if !self.evolution.api_url.starts_with("http://") && !self.evolution.api_url.starts_with("https://") {
            return Err(GatewayError::Config(format!(
                "evolution.api_url must be http(s): {}",
                self.evolution.api_url
            )));
        }
        // Surface bad regexes at startup rather than on the first message.
        super::messages::compile_rules(&self.auto_reply.rules)?;
        Ok(())
    }

    /// Where Evolution should deliver webhook events, carrying the webhook
    /// token when one is set.
    pub fn webhook_url(&self) -> String {
        let base = if self.evolution.webhook_url.is_empty() {
            format!("http://host.docker.internal:{}/webhook/whatsapp", self.port)
        } else {
            self.evolution.webhook_url.clone()
        };
        let token = &self.evolution.webhook_token;
        if token.is_empty() {
            return base;
        }
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", base, sep, urlencoding::encode(token))
    }

    /// Fill in a random webhook token if none was configured.
    pub fn ensure_webhook_token(&mut self) -> &str {
        if self.evolution.webhook_token.is_empty() {
            self.evolution.webhook_token = uuid::Uuid::new_v4().simple().to_string();
        }
        &self.evolution.webhook_token
    }
}

/// Read the TOML file at `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> GatewayResult<GatewayConfig> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| GatewayError::Config(format!("Read {}: {}", p.display(), e)))?;
            GatewayConfig::from_toml_str(&text)
        }
        None => Ok(GatewayConfig::default()),
    }
}
