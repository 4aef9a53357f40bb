//! Streaming wire messages.

use serde::{Deserialize, Deserializer, Serialize};

/// Typed inbound event, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    PriceUpdate {
        symbol: String,
        price: f64,
        #[serde(default)]
        change_percent: f64,
    },
    SignalUpdate {
        symbol: String,
        signal: String,
    },
    AlertTriggered {
        #[serde(deserialize_with = "string_or_number")]
        alert_id: String,
        message: String,
    },
}

impl StreamEvent {
    /// Decode one text frame. Unknown kinds and malformed payloads yield `None`.
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::PriceUpdate { .. } => "price_update",
            StreamEvent::SignalUpdate { .. } => "signal_update",
            StreamEvent::AlertTriggered { .. } => "alert_triggered",
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Int(value) => value.to_string(),
        Id::Float(value) => value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Subscribe,
    Unsubscribe,
}

/// Outbound control message: `{"action": "...", "channel": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: ControlAction,
    pub channel: String,
}

impl ControlMessage {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            channel: channel.into(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            channel: channel.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Connection state machine of the streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_price_update() {
        let event =
            StreamEvent::decode(r#"{"type":"price_update","symbol":"THYAO","price":312.5,"change_percent":-1.2}"#)
                .unwrap();
        assert_eq!(
            event,
            StreamEvent::PriceUpdate {
                symbol: "THYAO".to_string(),
                price: 312.5,
                change_percent: -1.2,
            }
        );
        assert_eq!(event.kind(), "price_update");
    }

    #[test]
    fn test_decode_alert_with_numeric_id() {
        let event =
            StreamEvent::decode(r#"{"type":"alert_triggered","alert_id":42,"message":"THYAO > 300"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::AlertTriggered {
                alert_id: "42".to_string(),
                message: "THYAO > 300".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed_are_dropped() {
        assert_eq!(StreamEvent::decode(r#"{"type":"heartbeat"}"#), None);
        assert_eq!(StreamEvent::decode(r#"{"symbol":"THYAO"}"#), None);
        assert_eq!(StreamEvent::decode(r#"{"type":"signal_update","symbol":"THYAO"}"#), None);
        assert_eq!(StreamEvent::decode("not json"), None);
    }

    #[test]
    fn test_control_message_wire_format() {
        let text = ControlMessage::subscribe("bist30_prices").encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({"action": "subscribe", "channel": "bist30_prices"}));

        let text = ControlMessage::unsubscribe("news").encode().unwrap();
        assert!(text.contains("\"unsubscribe\""));
    }
}
