//! JSON shapes shared by the API server and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Named server-sent events emitted on a room stream.
pub mod event {
    pub const NEW_MESSAGE: &str = "new-message";
    pub const PARTICIPANTS: &str = "participants";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Display data of a message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Author {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A persisted chat message together with its author.
///
/// This is the exact payload of a `new-message` event and of every element
/// returned by the reconciliation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    #[serde(with = "i64_string")]
    #[schema(value_type = String)]
    pub id: i64,
    pub room_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
}

/// Payload of a `participants` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParticipantsPayload {
    pub count: u64,
}

/// Snowflakes exceed the integer range JavaScript can represent, so they
/// travel as decimal strings. Numbers are still accepted on input.
pub mod i64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(val: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        match StrOrNum::deserialize(d)? {
            StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
            StrOrNum::Num(n) => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChatMessage {
        ChatMessage {
            id: 9_007_199_254_740_993,
            room_id: "room_1".into(),
            author_id: "usr_1".into(),
            text: "hello".into(),
            created_at: DateTime::parse_from_rfc3339("2025-03-01T10:00:00.123456Z")
                .unwrap()
                .with_timezone(&Utc),
            author: Author {
                id: "usr_1".into(),
                display_name: "Ada".into(),
                avatar_url: None,
            },
        }
    }

    #[test]
    fn message_id_serializes_as_string() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "9007199254740993");
        assert_eq!(json["author"]["display_name"], "Ada");
    }

    #[test]
    fn message_id_accepts_number_input() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["id"] = serde_json::json!(42);
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.id, 42);
    }

    #[test]
    fn created_at_keeps_microseconds() {
        let text = serde_json::to_string(&sample()).unwrap();
        let back: ChatMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back.created_at, sample().created_at);
    }
}
