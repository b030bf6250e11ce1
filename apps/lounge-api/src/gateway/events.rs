//! Room channel envelopes and their server-sent event encoding.

use axum::response::sse::Event;
use chrono::{DateTime, SecondsFormat, Utc};
use lounge_common::wire::{event, ChatMessage, ParticipantsPayload};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Channel envelope
// ---------------------------------------------------------------------------

/// An event published on a room's broadcast channel.
///
/// Serialized as `{"event": "...", "data": ...}`; the event name doubles as
/// the SSE event name when relayed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RoomEvent {
    #[serde(rename = "new-message")]
    NewMessage(ChatMessage),
    #[serde(rename = "participants")]
    Participants(ParticipantsPayload),
}

impl RoomEvent {
    pub fn participants(count: u64) -> Self {
        RoomEvent::Participants(ParticipantsPayload { count })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::NewMessage(_) => event::NEW_MESSAGE,
            RoomEvent::Participants(_) => event::PARTICIPANTS,
        }
    }

    /// Encode for the SSE stream: the event name plus its data as JSON.
    pub fn to_sse(&self) -> Result<Event, axum::Error> {
        let sse = Event::default().event(self.name());
        match self {
            RoomEvent::NewMessage(message) => sse.json_data(message),
            RoomEvent::Participants(payload) => sse.json_data(payload),
        }
    }
}

/// `heartbeat` event carrying the server time.
pub fn heartbeat(now: DateTime<Utc>) -> Event {
    Event::default()
        .event(event::HEARTBEAT)
        .data(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}
