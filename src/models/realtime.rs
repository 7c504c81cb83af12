use chrono::{ DateTime, TimeZone, Utc };
use serde::{ Serialize, Deserialize };
use serde_json::Value as JsonValue;

use super::user::UserId;
use crate::error::ChatResult;

/// Frames this client sends. Serialised as `{"event": .., "data": ..}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join")] Join {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    #[serde(rename = "send_message")] SendMessage {
        #[serde(rename = "senderId")]
        sender_id: UserId,
        #[serde(rename = "receiverId")]
        receiver_id: UserId,
        message: String,
    },
    #[serde(rename = "typing")] Typing {
        #[serde(rename = "receiverId")]
        receiver_id: UserId,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::Typing { .. } => "typing",
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    #[serde(rename = "senderId")]
    pub sender_id: UserId,
    #[serde(rename = "receiverId")]
    pub receiver_id: UserId,
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingNotice {
    #[serde(rename = "senderId", default)]
    pub sender_id: Option<UserId>,
}

/// Frames this client understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ReceiveMessage(InboundMessage),
    Typing(TypingNotice),
    OnlineUsers(Vec<UserId>),
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: JsonValue,
}

impl ServerEvent {
    /// Parses one text frame. Events this client does not consume yield `None`.
    pub fn from_frame(text: &str) -> ChatResult<Option<ServerEvent>> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let event = match envelope.event.as_str() {
            "receive_message" => ServerEvent::ReceiveMessage(serde_json::from_value(envelope.data)?),
            "typing" => {
                // Older servers send a bare `typing` with no payload.
                let notice = if envelope.data.is_null() {
                    TypingNotice::default()
                } else {
                    serde_json::from_value(envelope.data)?
                };
                ServerEvent::Typing(notice)
            }
            "online_users" => ServerEvent::OnlineUsers(serde_json::from_value(envelope.data)?),
            _ => {
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub fn to_frame(&self) -> ChatResult<String> {
        let (event, data) = match self {
            ServerEvent::ReceiveMessage(msg) => {
                let mut data = serde_json::json!({
                    "senderId": msg.sender_id,
                    "receiverId": msg.receiver_id,
                    "message": msg.message,
                });
                if let Some(ts) = msg.timestamp {
                    data["timestamp"] = JsonValue::from(ts.timestamp_millis());
                }
                ("receive_message", data)
            }
            ServerEvent::Typing(notice) =>
                ("typing", match &notice.sender_id {
                    Some(id) => serde_json::json!({ "senderId": id }),
                    None => JsonValue::Null,
                }),
            ServerEvent::OnlineUsers(ids) => ("online_users", serde_json::to_value(ids)?),
        };
        Ok(serde_json::json!({ "event": event, "data": data }).to_string())
    }
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where D: serde::Deserializer<'de>
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Millis(ms)) =>
            Utc.timestamp_millis_opt(ms)
                .single()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
        Some(RawTimestamp::Text(text)) =>
            DateTime::parse_from_rfc3339(&text)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
    }
}
