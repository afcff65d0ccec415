// WhatsApp Gateway — Evolution API Transport
// EvolutionTransport (SessionTransport impl): create/delete instance,
// connect (QR re-issue), extract_qr_from_response, connection watcher,
// sendText/sendMedia, findChats/findMessages, logout

use super::config::EvolutionConfig;
use super::transport::{
    Chat, DeliveryReceipt, EventSender, Message, OutboundPayload, SessionTransport, TransportEvent,
};
use crate::atoms::constants::{CONNECTION_POLL_INTERVAL_SECS, MAX_TEXT_CHUNK, TRANSPORT_CONNECT_TIMEOUT_SECS};
use crate::atoms::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct EvolutionTransport {
    client: reqwest::Client,
    config: EvolutionConfig,
    webhook_url: String,
    events: EventSender,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl EvolutionTransport {
    pub fn new(config: EvolutionConfig, webhook_url: String, events: EventSender) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(TRANSPORT_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(EvolutionTransport {
            client,
            config,
            webhook_url,
            events,
            watcher: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path,
            urlencoding::encode(&self.config.instance_name)
        )
    }

    fn create_body(&self) -> Value {
        // Unique token per attempt avoids "Token already exists" collisions.
        let instance_token = format!("wa-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        json!({
            "instanceName": self.config.instance_name,
            "token": instance_token,
            "qrcode": true,
            "webhook": self.webhook_url,
        })
    }

    // ── Instance Management ────────────────────────────────────────────────

    /// Create the instance and return the QR (empty if none was issued).
    async fn create_instance(&self) -> GatewayResult<String> {
        let url = format!("{}/instance/create", self.config.api_url.trim_end_matches('/'));
        info!("[evolution] Creating instance '{}'", self.config.instance_name);

        let (status, text) = self.post_raw(&url, &self.create_body()).await.map_err(init_error)?;
        debug!("[evolution] Instance create response [{}]: {}", status, truncate(&text, 500));

        if status.is_success() {
            let resp: Value = serde_json::from_str(&text).unwrap_or_default();
            return Ok(extract_qr_from_response(&resp));
        }

        let lower = text.to_lowercase();
        let is_instance_exists = lower.contains("instance") && (lower.contains("already") || lower.contains("exists"));
        let is_token_exists = lower.contains("token") && lower.contains("already");
        if !(is_instance_exists || is_token_exists) {
            return Err(GatewayError::TransportInit(format!("Create instance failed ({}): {}", status, text)));
        }

        info!("[evolution] Instance/token conflict, deleting instance and recreating");
        self.delete_instance().await;

        let (status, text) = self.post_raw(&url, &self.create_body()).await.map_err(init_error)?;
        if !status.is_success() {
            return Err(GatewayError::TransportInit(format!(
                "Create instance failed after delete ({}): {}",
                status, text
            )));
        }
        let resp: Value = serde_json::from_str(&text).unwrap_or_default();
        Ok(extract_qr_from_response(&resp))
    }

    async fn delete_instance(&self) {
        let url = self.url("instance/delete");
        match self.client.delete(&url).header("apikey", &self.config.api_key).send().await {
            Ok(resp) => info!("[evolution] Delete instance response [{}]", resp.status()),
            Err(e) => warn!("[evolution] Delete instance failed: {}", e),
        }
        // Let the API settle before the retry.
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    async fn post_raw(&self, url: &str, body: &Value) -> Result<(reqwest::StatusCode, String), reqwest::Error> {
        let resp = self
            .client
            .post(url)
            .header("apikey", &self.config.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }

    /// Ask Evolution for a fresh QR on an existing instance and emit it.
    async fn reconnect(&self) -> GatewayResult<()> {
        let qr = request_qr(&self.client, &self.url("instance/connect"), &self.config.api_key)
            .await
            .map_err(init_error)?;
        emit_qr(&self.events, qr).await
    }

    fn spawn_connection_watcher(&self) {
        let client = self.client.clone();
        let url = self.url("instance/connectionState");
        let connect_url = self.url("instance/connect");
        let api_key = self.config.api_key.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(CONNECTION_POLL_INTERVAL_SECS));
            let mut connected = false;
            loop {
                interval.tick().await;
                let state = match client.get(&url).header("apikey", &api_key).send().await {
                    Ok(resp) => match resp.json::<Value>().await {
                        Ok(body) => connection_state(&body).to_string(),
                        Err(_) => continue,
                    },
                    Err(e) => {
                        warn!("[evolution] Connection check failed: {}", e);
                        continue;
                    }
                };

                let now_open = state == "open" || state == "connected";
                let emitted = match (connected, now_open) {
                    (false, true) => {
                        info!("[evolution] Session connected (polled)");
                        events.send(TransportEvent::Authenticated).await.is_ok()
                            && events.send(TransportEvent::Ready).await.is_ok()
                    }
                    (true, false) if state == "close" => {
                        info!("[evolution] Session closed (polled)");
                        if events.send(TransportEvent::Disconnected).await.is_err() {
                            break;
                        }
                        match request_qr(&client, &connect_url, &api_key).await {
                            Ok(qr) => emit_qr(&events, qr).await.is_ok(),
                            Err(e) => {
                                warn!("[evolution] QR re-issue after close failed: {}", e);
                                true
                            }
                        }
                    }
                    _ => true,
                };
                if !emitted {
                    break;
                }
                if now_open || state == "close" {
                    connected = now_open;
                }
            }
        });

        if let Some(old) = self.watcher.lock().replace(handle) {
            old.abort();
        }
    }

    // ── Sending ────────────────────────────────────────────────────────────

    async fn post_send(&self, path: &str, recipient: &str, body: Value) -> GatewayResult<DeliveryReceipt> {
        let (status, text) = self
            .post_raw(&self.url(path), &body)
            .await
            .map_err(|e| GatewayError::TransportSend(e.to_string()))?;

        if !status.is_success() {
            let compact = text.replace(' ', "");
            if status == reqwest::StatusCode::BAD_REQUEST && compact.contains("\"exists\":false") {
                return Err(GatewayError::InvalidRecipient(format!("{} is not on WhatsApp", recipient)));
            }
            warn!("[evolution] {} error [{}]: {}", path, status, truncate(&text, 300));
            return Err(GatewayError::TransportSend(format!("{}: {}", status, truncate(&text, 300))));
        }

        let raw: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(receipt_from_response(recipient, raw))
    }

    async fn post_fetch(&self, path: &str, body: Value) -> GatewayResult<Value> {
        let resp = self
            .client
            .post(self.url(path))
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::TransportFetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::TransportFetch(format!("{}: {}", status, truncate(&text, 300))));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| GatewayError::TransportFetch(e.to_string()))
    }
}

impl Drop for EvolutionTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl SessionTransport for EvolutionTransport {
    async fn initialize(&self) -> GatewayResult<()> {
        let qr = self.create_instance().await?;
        emit_qr(&self.events, qr).await?;
        if self.config.poll_connection {
            self.spawn_connection_watcher();
        }
        Ok(())
    }

    async fn send(&self, recipient: &str, payload: &OutboundPayload) -> GatewayResult<DeliveryReceipt> {
        let number = normalize_recipient(recipient)?;
        match payload {
            OutboundPayload::Text(text) => {
                let mut last = None;
                for chunk in split_message(text, MAX_TEXT_CHUNK) {
                    let body = json!({ "number": number, "text": chunk });
                    last = Some(self.post_send("message/sendText", &number, body).await?);
                }
                last.ok_or_else(|| GatewayError::TransportSend("empty message".into()))
            }
            OutboundPayload::Media { media, caption } => {
                let body = json!({
                    "number": number,
                    "mediatype": media.media_type,
                    "media": media.url,
                    "caption": caption.clone().unwrap_or_default(),
                });
                self.post_send("message/sendMedia", &number, body).await
            }
        }
    }

    async fn fetch_chats(&self) -> GatewayResult<Vec<Chat>> {
        let resp = self.post_fetch("chat/findChats", json!({})).await?;
        Ok(records(resp).into_iter().map(Chat).collect())
    }

    async fn fetch_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>> {
        let jid = to_jid(chat_id);
        let body = json!({ "where": { "key": { "remoteJid": jid } } });
        let resp = self.post_fetch("chat/findMessages", body).await?;
        Ok(records(resp).into_iter().map(Message).collect())
    }

    async fn logout(&self) -> GatewayResult<()> {
        let resp = self
            .client
            .delete(self.url("instance/logout"))
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::TransportSend(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::TransportSend(format!("Logout failed ({}): {}", status, truncate(&text, 300))));
        }
        info!("[evolution] Instance logged out");
        if let Err(e) = self.reconnect().await {
            warn!("[evolution] QR re-issue after logout failed: {}", e);
        }
        Ok(())
    }
}

// ── Response Helpers ───────────────────────────────────────────────────────

/// `GET instance/connect/{instance}`: the QR for an instance that exists but
/// is not paired. Empty when Evolution returns none (already connected).
async fn request_qr(client: &reqwest::Client, url: &str, api_key: &str) -> Result<String, reqwest::Error> {
    let resp = client.get(url).header("apikey", api_key).send().await?;
    let text = resp.text().await.unwrap_or_default();
    debug!("[evolution] Connect instance response: {}", truncate(&text, 500));
    let body: Value = serde_json::from_str(&text).unwrap_or_default();
    Ok(extract_qr_from_response(&body))
}

async fn emit_qr(events: &EventSender, qr: String) -> GatewayResult<()> {
    if qr.is_empty() {
        return Ok(());
    }
    info!("[evolution] QR code generated, waiting for scan");
    events
        .send(TransportEvent::Qr(qr))
        .await
        .map_err(|_| GatewayError::TransportInit("event channel closed".into()))
}

fn init_error(e: reqwest::Error) -> GatewayError {
    GatewayError::TransportInit(e.to_string())
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extract QR code base64 from the various Evolution API response shapes.
pub(crate) fn extract_qr_from_response(resp: &Value) -> String {
    // create: { "qrcode": { "base64": "data:image/..." } }
    // connect: { "base64": "data:image/..." }
    // also: { "qrcode": "data:image/..." }
    let qr = resp["qrcode"]["base64"]
        .as_str()
        .or_else(|| resp["base64"].as_str())
        .or_else(|| resp["qrcode"].as_str().filter(|s| s.starts_with("data:")))
        .unwrap_or("")
        .to_string();

    if qr.is_empty() {
        let qr_field = &resp["qrcode"];
        warn!(
            "[evolution] QR extraction returned empty. qrcode keys: {:?}",
            qr_field.as_object().map(|o| o.keys().collect::<Vec<_>>())
        );
    } else {
        debug!("[evolution] QR code extracted ({} bytes)", qr.len());
    }
    qr
}

fn connection_state(body: &Value) -> &str {
    body["instance"]["state"]
        .as_str()
        .or_else(|| body["state"].as_str())
        .unwrap_or("")
}

fn receipt_from_response(recipient: &str, raw: Value) -> DeliveryReceipt {
    DeliveryReceipt {
        id: raw["key"]["id"].as_str().map(str::to_string),
        recipient: raw["key"]["remoteJid"]
            .as_str()
            .unwrap_or(recipient)
            .to_string(),
        status: raw["status"].as_str().map(str::to_string),
        sent_at: chrono::Utc::now(),
        raw,
    }
}

/// Accept a bare array, `{records: [...]}`, or `{messages: {records: [...]}}`.
fn records(resp: Value) -> Vec<Value> {
    match resp {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            if let Some(Value::Array(items)) = obj.remove("records") {
                return items;
            }
            match obj.remove("messages") {
                Some(Value::Array(items)) => items,
                Some(Value::Object(mut inner)) => match inner.remove("records") {
                    Some(Value::Array(items)) => items,
                    _ => vec![],
                },
                _ => vec![],
            }
        }
        _ => vec![],
    }
}

// ── Recipient Normalization ────────────────────────────────────────────────

/// Bare digits (with optional `+`, spaces, dashes, parentheses) or a full
/// JID. User JIDs collapse to digits; group JIDs pass through whole.
pub(crate) fn normalize_recipient(recipient: &str) -> GatewayResult<String> {
    let trimmed = recipient.trim();
    let invalid = || GatewayError::InvalidRecipient(trimmed.to_string());

    if let Some((local, domain)) = trimmed.split_once('@') {
        if local.is_empty() {
            return Err(invalid());
        }
        return match domain {
            "g.us" => Ok(trimmed.to_string()),
            "s.whatsapp.net" | "c.us" if local.chars().all(|c| c.is_ascii_digit()) => Ok(local.to_string()),
            _ => Err(invalid()),
        };
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '(' | ')'))
        .collect();
    if (5..=20).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(digits)
    } else {
        Err(invalid())
    }
}

fn to_jid(chat_id: &str) -> String {
    if chat_id.contains('@') {
        chat_id.to_string()
    } else {
        format!("{}@s.whatsapp.net", chat_id)
    }
}

/// Split a long message into chunks at a given limit, preferring newline/space breaks.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let split_at = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
    chunks
}
