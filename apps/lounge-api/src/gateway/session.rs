//! Per-connection stream session state.

use std::sync::atomic::{AtomicBool, Ordering};

/// State for a single SSE connection.
pub struct StreamSession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    pub room_id: String,
    /// Authenticated author streaming this room.
    pub author_id: String,
    torn_down: AtomicBool,
}

impl StreamSession {
    pub fn new(connection_id: String, room_id: String, author_id: String) -> Self {
        Self {
            connection_id,
            room_id,
            author_id,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Claim the teardown. Only the first caller gets `true`.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}
