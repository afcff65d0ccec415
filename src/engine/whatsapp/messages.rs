// WhatsApp Gateway — Inbound Message Handling
// AutoReplyRule, compile_rules, AutoReplyEngine::handle_inbound_message

use super::config::{AutoReplyConfig, MatchKind, RuleConfig};
use super::gateway::Gateway;
use super::transport::{DeliveryReceipt, IncomingMessage};
use crate::atoms::error::{GatewayError, GatewayResult};
use log::{debug, info, warn};
use regex::Regex;

// ── Rules ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Whole body equals the pattern after trimming whitespace.
    Exact(String),
    /// Body contains the pattern, case-insensitive. Stored lowercased.
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    pub fn matches(&self, body: &str) -> bool {
        match self {
            Matcher::Exact(p) => body.trim() == p,
            Matcher::Contains(p) => body.to_lowercase().contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutoReplyRule {
    pub matcher: Matcher,
    pub response: String,
}

impl AutoReplyRule {
    pub fn exact(pattern: &str, response: &str) -> Self {
        AutoReplyRule {
            matcher: Matcher::Exact(pattern.trim().to_string()),
            response: response.to_string(),
        }
    }
}

pub fn compile_rules(rules: &[RuleConfig]) -> GatewayResult<Vec<AutoReplyRule>> {
    rules
        .iter()
        .map(|r| {
            let matcher = match r.match_kind {
                MatchKind::Exact => Matcher::Exact(r.pattern.trim().to_string()),
                MatchKind::Contains => Matcher::Contains(r.pattern.to_lowercase()),
                MatchKind::Regex => Matcher::Regex(Regex::new(&r.pattern).map_err(|e| {
                    GatewayError::Config(format!("Auto-reply pattern '{}': {}", r.pattern, e))
                })?),
            };
            Ok(AutoReplyRule { matcher, response: r.response.clone() })
        })
        .collect()
}

// ── Engine ─────────────────────────────────────────────────────────────────

/// Ordered rule set, fixed at startup. First match wins.
#[derive(Debug, Clone)]
pub struct AutoReplyEngine {
    rules: Vec<AutoReplyRule>,
    enabled: bool,
    respond_in_groups: bool,
}

impl AutoReplyEngine {
    pub fn new(rules: Vec<AutoReplyRule>) -> Self {
        AutoReplyEngine { rules, enabled: true, respond_in_groups: false }
    }

    pub fn from_config(config: &AutoReplyConfig) -> GatewayResult<Self> {
        Ok(AutoReplyEngine {
            rules: compile_rules(&config.rules)?,
            enabled: config.enabled,
            respond_in_groups: config.respond_in_groups,
        })
    }

    pub fn with_groups(mut self, respond_in_groups: bool) -> Self {
        self.respond_in_groups = respond_in_groups;
        self
    }

    pub fn rules(&self) -> &[AutoReplyRule] {
        &self.rules
    }

    /// Reply text for `msg`, or `None` when the message should be left alone.
    pub fn evaluate(&self, msg: &IncomingMessage) -> Option<&str> {
        if !self.enabled || msg.from_me || !msg.is_addressable() || msg.sender.is_empty() {
            return None;
        }
        if msg.is_group() && !self.respond_in_groups {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&msg.body))
            .map(|rule| rule.response.as_str())
    }

    /// Reply through the facade so the same session gate applies. A failed
    /// send is logged and dropped: the inbound event is not re-deliverable.
    pub async fn handle_inbound_message(&self, gateway: &Gateway, msg: IncomingMessage) -> Option<DeliveryReceipt> {
        gateway.record_inbound();

        let preview = if msg.body.chars().count() > 50 {
            format!("{}...", msg.body.chars().take(50).collect::<String>())
        } else {
            msg.body.clone()
        };
        debug!(
            "[auto-reply] Message from {} ({}): {}",
            msg.push_name.as_deref().unwrap_or(&msg.sender),
            msg.sender,
            preview
        );

        let reply = self.evaluate(&msg)?;
        match gateway.send_message(&msg.chat_id, reply).await {
            Ok(receipt) => {
                info!("[auto-reply] Replied to {}", msg.chat_id);
                Some(receipt)
            }
            Err(e) => {
                warn!("[auto-reply] Reply to {} dropped: {}", msg.chat_id, e);
                None
            }
        }
    }
}

impl Default for AutoReplyEngine {
    fn default() -> Self {
        AutoReplyEngine::new(vec![
            AutoReplyRule::exact("Hi", "Hello!"),
            AutoReplyRule::exact("How are you?", "I am fine, thank you!"),
        ])
    }
}
