//! Local view of one room: the message timeline and participant count.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lounge_common::wire::ChatMessage;

/// Messages known to the client, deduplicated by id.
///
/// The watermark is the newest `created_at` seen so far (epoch zero when the
/// timeline is empty); reconciliation asks for everything from just below it.
#[derive(Debug, Clone)]
pub struct RoomTimeline {
    messages: Vec<ChatMessage>,
    known: HashSet<i64>,
    watermark: DateTime<Utc>,
    participants: Option<u64>,
    last_heartbeat: Option<Instant>,
}

impl RoomTimeline {
    /// Seed from the room page's initial message list.
    pub fn new(initial: Vec<ChatMessage>) -> Self {
        let mut timeline = Self {
            messages: Vec::with_capacity(initial.len()),
            known: HashSet::new(),
            watermark: DateTime::UNIX_EPOCH,
            participants: None,
            last_heartbeat: None,
        };
        timeline.merge(initial);
        timeline
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Lower bound for a reconciliation fetch.
    ///
    /// Several messages can share a `created_at`, and the server only returns
    /// messages strictly after `since`, so the bound sits one microsecond
    /// under the watermark. The overlap is dropped by id on merge.
    pub fn reconcile_since(&self) -> DateTime<Utc> {
        (self.watermark - chrono::Duration::microseconds(1)).max(DateTime::UNIX_EPOCH)
    }

    pub fn participants(&self) -> Option<u64> {
        self.participants
    }

    pub fn contains(&self, id: i64) -> bool {
        self.known.contains(&id)
    }

    /// Append the message unless its id is already known.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.known.insert(message.id) {
            return false;
        }
        if message.created_at > self.watermark {
            self.watermark = message.created_at;
        }
        self.messages.push(message);
        true
    }

    /// Append every unseen message, returning the ones that were new.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = ChatMessage>) -> Vec<ChatMessage> {
        let mut added = Vec::new();
        for message in incoming {
            if self.insert(message.clone()) {
                added.push(message);
            }
        }
        added
    }

    pub fn set_participants(&mut self, count: u64) {
        self.participants = Some(count);
    }

    pub fn record_heartbeat(&mut self, at: Instant) {
        self.last_heartbeat = Some(at);
    }

    /// Time since the last heartbeat, or `None` if none arrived yet.
    pub fn since_heartbeat(&self, now: Instant) -> Option<Duration> {
        self.last_heartbeat
            .map(|at| now.saturating_duration_since(at))
    }
}

impl Default for RoomTimeline {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
