// WhatsApp Gateway — Webhook Event Mapping
// parse_webhook_event, parse_upsert: Evolution API webhook payloads to
// TransportEvent

use super::transport::{IncomingMessage, TransportEvent};
use log::{debug, info};
use serde_json::Value;

/// Event names arrive as `qrcode.updated` (v1) or `QRCODE_UPDATED` (v2).
fn normalize_event_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', ".")
}

/// Map one webhook body to the lifecycle/message events it carries.
/// Unknown events and unusable payloads map to nothing.
pub fn parse_webhook_event(payload: &Value) -> Vec<TransportEvent> {
    let event = normalize_event_name(payload["event"].as_str().unwrap_or(""));
    let data = &payload["data"];

    match event.as_str() {
        "qrcode.updated" => {
            let qr = data["qrcode"]["base64"]
                .as_str()
                .or_else(|| data["qrcode"].as_str())
                .or_else(|| data["base64"].as_str())
                .unwrap_or("");
            if qr.is_empty() {
                vec![]
            } else {
                vec![TransportEvent::Qr(qr.to_string())]
            }
        }
        "connection.update" => match data["state"].as_str().unwrap_or("") {
            "open" | "connected" => {
                info!("[webhook] Connection confirmed via webhook");
                vec![TransportEvent::Authenticated, TransportEvent::Ready]
            }
            "close" => vec![TransportEvent::Disconnected],
            _ => vec![],
        },
        "logout.instance" => vec![TransportEvent::Disconnected],
        "messages.upsert" => parse_upsert(data)
            .into_iter()
            .map(TransportEvent::Message)
            .collect(),
        other => {
            debug!("[webhook] Ignoring event '{}'", other);
            vec![]
        }
    }
}

/// `data` is a single message, an array of them, or `{messages: [...]}`.
pub fn parse_upsert(data: &Value) -> Vec<IncomingMessage> {
    let items: Vec<&Value> = match data {
        Value::Array(arr) => arr.iter().collect(),
        Value::Object(obj) => match obj.get("messages") {
            Some(Value::Array(arr)) => arr.iter().collect(),
            _ => vec![data],
        },
        _ => vec![],
    };
    items.into_iter().filter_map(parse_message).collect()
}

fn parse_message(msg: &Value) -> Option<IncomingMessage> {
    let key = &msg["key"];
    let content = &msg["message"];
    let text = content["conversation"]
        .as_str()
        .or_else(|| content["extendedTextMessage"]["text"].as_str())
        .or_else(|| content["imageMessage"]["caption"].as_str())
        .or_else(|| content["videoMessage"]["caption"].as_str())
        .or_else(|| content["documentMessage"]["caption"].as_str())
        .unwrap_or("");
    if text.is_empty() {
        return None;
    }

    let chat_id = key["remoteJid"].as_str().unwrap_or("").to_string();
    let sender = key["participant"]
        .as_str()
        .filter(|p| !p.is_empty())
        .unwrap_or(&chat_id)
        .to_string();

    Some(IncomingMessage {
        id: key["id"].as_str().map(str::to_string),
        chat_id,
        sender,
        push_name: msg["pushName"].as_str().map(str::to_string),
        body: text.to_string(),
        from_me: key["fromMe"].as_bool().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qr_events_in_both_shapes() {
        let v1 = json!({"event": "qrcode.updated", "data": {"qrcode": {"base64": "data:image/png;base64,AA"}}});
        assert_eq!(parse_webhook_event(&v1), vec![TransportEvent::Qr("data:image/png;base64,AA".into())]);
        let v2 = json!({"event": "QRCODE_UPDATED", "data": {"qrcode": "2@abc"}});
        assert_eq!(parse_webhook_event(&v2), vec![TransportEvent::Qr("2@abc".into())]);
        let empty = json!({"event": "qrcode.updated", "data": {}});
        assert!(parse_webhook_event(&empty).is_empty());
    }

    #[test]
    fn connection_updates() {
        let open = json!({"event": "connection.update", "data": {"state": "open"}});
        assert_eq!(
            parse_webhook_event(&open),
            vec![TransportEvent::Authenticated, TransportEvent::Ready]
        );
        let close = json!({"event": "CONNECTION_UPDATE", "data": {"state": "close"}});
        assert_eq!(parse_webhook_event(&close), vec![TransportEvent::Disconnected]);
        let connecting = json!({"event": "connection.update", "data": {"state": "connecting"}});
        assert!(parse_webhook_event(&connecting).is_empty());
        let logout = json!({"event": "logout.instance", "data": {}});
        assert_eq!(parse_webhook_event(&logout), vec![TransportEvent::Disconnected]);
    }

    #[test]
    fn upsert_extracts_text_and_sender() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "key": {"remoteJid": "120363@g.us", "participant": "628123@s.whatsapp.net", "fromMe": false, "id": "X1"},
                "pushName": "Bob",
                "message": {"extendedTextMessage": {"text": "Hi"}}
            }
        });
        let events = parse_webhook_event(&payload);
        let TransportEvent::Message(msg) = &events[0] else { panic!("expected message") };
        assert_eq!(msg.chat_id, "120363@g.us");
        assert_eq!(msg.sender, "628123@s.whatsapp.net");
        assert_eq!(msg.push_name.as_deref(), Some("Bob"));
        assert_eq!(msg.body, "Hi");
        assert_eq!(msg.id.as_deref(), Some("X1"));
        assert!(msg.is_group());
    }

    #[test]
    fn upsert_batches_and_skips_non_text() {
        let data = json!([
            {"key": {"remoteJid": "1@s.whatsapp.net", "fromMe": true}, "message": {"conversation": "mine"}},
            {"key": {"remoteJid": "2@s.whatsapp.net"}, "message": {"reactionMessage": {"text": "+1"}}},
            {"key": {"remoteJid": "3@s.whatsapp.net"}, "message": {"imageMessage": {"caption": "look"}}}
        ]);
        let msgs = parse_upsert(&data);
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].from_me);
        assert_eq!(msgs[0].sender, "1@s.whatsapp.net");
        assert_eq!(msgs[1].body, "look");

        let wrapped = json!({"messages": [{"key": {"remoteJid": "4@s.whatsapp.net"}, "message": {"conversation": "Hi"}}]});
        assert_eq!(parse_upsert(&wrapped)[0].chat_id, "4@s.whatsapp.net");
    }

    #[test]
    fn unknown_events_ignored() {
        assert!(parse_webhook_event(&json!({"event": "presence.update", "data": {}})).is_empty());
        assert!(parse_webhook_event(&json!({})).is_empty());
    }
}
