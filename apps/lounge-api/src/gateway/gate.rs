//! Session gate: whether a room's live chat is open right now.
//!
//! Always recomputed against the supplied clock; nothing is cached.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::store::ChatStore;
use crate::error::ApiError;
use crate::models::chat_session::ChatSession;
use crate::models::room::Room;

pub const NO_SESSION_MESSAGE: &str = "This room has no scheduled session";
pub const PENDING_MESSAGE: &str = "The session has not started yet";
pub const CLOSED_MESSAGE: &str = "The session has ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GateDecision {
    pub status: SessionStatus,
    /// Human-readable reason; absent while the session is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GateDecision {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    fn closed(message: &str) -> Self {
        Self {
            status: SessionStatus::Closed,
            message: Some(message.to_string()),
        }
    }
}

/// Derive the gate status of a session at `now`. Both bounds are inclusive.
pub fn evaluate(session: Option<&ChatSession>, now: DateTime<Utc>) -> GateDecision {
    let Some(session) = session else {
        return GateDecision::closed(NO_SESSION_MESSAGE);
    };

    if now < session.start_date {
        GateDecision {
            status: SessionStatus::Pending,
            message: Some(PENDING_MESSAGE.to_string()),
        }
    } else if now > session.end_date {
        GateDecision::closed(CLOSED_MESSAGE)
    } else {
        GateDecision {
            status: SessionStatus::Active,
            message: None,
        }
    }
}

/// Look up the room's session and evaluate it. A dangling `session_id` is
/// treated the same as no session.
pub async fn check_room(
    store: &dyn ChatStore,
    room: &Room,
    now: DateTime<Utc>,
) -> Result<GateDecision, ApiError> {
    let session = match &room.session_id {
        Some(session_id) => store.get_session(session_id).await?,
        None => None,
    };
    Ok(evaluate(session.as_ref(), now))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(start: DateTime<Utc>, end: DateTime<Utc>) -> ChatSession {
        ChatSession {
            id: "ses_1".to_string(),
            name: "Office hours".to_string(),
            start_date: start,
            end_date: end,
            description: None,
            link: None,
            created_at: start,
        }
    }

    #[test]
    fn status_follows_the_clock() {
        let now = Utc::now();
        let s = session(now, now + Duration::hours(1));

        assert_eq!(evaluate(Some(&s), now - Duration::seconds(1)).status, SessionStatus::Pending);
        assert_eq!(evaluate(Some(&s), now).status, SessionStatus::Active);
        assert_eq!(evaluate(Some(&s), now + Duration::hours(1)).status, SessionStatus::Active);
        assert_eq!(
            evaluate(Some(&s), now + Duration::hours(1) + Duration::milliseconds(1)).status,
            SessionStatus::Closed
        );
    }

    #[test]
    fn missing_session_is_closed_with_its_own_message() {
        let now = Utc::now();
        let none = evaluate(None, now);
        let ended = evaluate(Some(&session(now - Duration::hours(2), now - Duration::hours(1))), now);

        assert_eq!(none.status, SessionStatus::Closed);
        assert_eq!(ended.status, SessionStatus::Closed);
        assert_ne!(none.message, ended.message);
        assert_eq!(none.message.as_deref(), Some(NO_SESSION_MESSAGE));
    }

    #[test]
    fn active_decision_serializes_without_message() {
        let now = Utc::now();
        let decision = evaluate(Some(&session(now - Duration::hours(1), now + Duration::hours(1))), now);
        assert!(decision.is_active());
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            serde_json::json!({ "status": "active" })
        );
    }
}
