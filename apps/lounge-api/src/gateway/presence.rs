//! Room presence backed by the shared key-value store.
//!
//! Presence is per-**author**, not per-connection. The participant set
//! `chat:{room}:participants` holds author ids; every open connection also
//! owns a liveness key `chat:{room}:live:{author}:{connection}` whose TTL is
//! refreshed on each heartbeat. The author's connection ids are tracked in
//! `chat:{room}:conns:{author}` so liveness checks never scan the keyspace.
//! An author stays in the participant set as long as at least one of their
//! liveness keys exists.
//!
//! All mutations are single-key commands. Concurrent connections converge
//! through the dedup-on-join protocol and the periodic sweep, not through
//! locking, so two connections may briefly disagree about who is
//! authoritative.

use std::sync::Arc;

use crate::config::PresenceTiming;
use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

use super::session::StreamSession;

pub fn participants_key(room_id: &str) -> String {
    format!("chat:{room_id}:participants")
}

pub fn connections_key(room_id: &str, author_id: &str) -> String {
    format!("chat:{room_id}:conns:{author_id}")
}

pub fn liveness_key(room_id: &str, author_id: &str, connection_id: &str) -> String {
    format!("chat:{room_id}:live:{author_id}:{connection_id}")
}

#[derive(Clone)]
pub struct RoomPresence {
    kv: Arc<dyn KeyValueStore>,
    timing: PresenceTiming,
}

impl RoomPresence {
    pub fn new(kv: Arc<dyn KeyValueStore>, timing: PresenceTiming) -> Self {
        Self { kv, timing }
    }

    pub fn timing(&self) -> PresenceTiming {
        self.timing
    }

    /// Delete every liveness key the author holds in the room. The owning
    /// connections notice on their next tick and tear themselves down.
    ///
    /// Returns how many superseded keys were removed.
    pub async fn evict_stale(&self, room_id: &str, author_id: &str) -> Result<usize, ApiError> {
        let conns_key = connections_key(room_id, author_id);
        let mut evicted = 0;
        for connection_id in self.kv.set_members(&conns_key).await? {
            if self
                .kv
                .del(&liveness_key(room_id, author_id, &connection_id))
                .await?
            {
                evicted += 1;
            }
            self.kv.set_remove(&conns_key, &connection_id).await?;
        }
        Ok(evicted)
    }

    /// Register the connection and return the room's new participant count.
    ///
    /// The liveness key and connection entry are written before the set
    /// membership so a concurrent sweep never sees the author without a key.
    pub async fn join(&self, session: &StreamSession) -> Result<u64, ApiError> {
        self.kv
            .set_ex(
                &liveness_key(&session.room_id, &session.author_id, &session.connection_id),
                &session.connection_id,
                self.timing.liveness_ttl,
            )
            .await?;
        self.kv
            .set_add(
                &connections_key(&session.room_id, &session.author_id),
                &session.connection_id,
            )
            .await?;
        self.kv
            .set_add(&participants_key(&session.room_id), &session.author_id)
            .await?;
        self.count(&session.room_id).await
    }

    pub async fn is_alive(&self, session: &StreamSession) -> Result<bool, ApiError> {
        self.kv
            .exists(&liveness_key(
                &session.room_id,
                &session.author_id,
                &session.connection_id,
            ))
            .await
    }

    /// Push the liveness key's expiry forward. Returns `false` if the key is
    /// already gone.
    pub async fn refresh(&self, session: &StreamSession) -> Result<bool, ApiError> {
        self.kv
            .expire(
                &liveness_key(&session.room_id, &session.author_id, &session.connection_id),
                self.timing.liveness_ttl,
            )
            .await
    }

    /// Drop the connection's liveness key and, when it was the author's last
    /// connection in the room, remove the author from the participant set.
    ///
    /// Returns the new count only when membership actually changed.
    pub async fn leave(&self, session: &StreamSession) -> Result<Option<u64>, ApiError> {
        self.kv
            .del(&liveness_key(
                &session.room_id,
                &session.author_id,
                &session.connection_id,
            ))
            .await?;
        self.kv
            .set_remove(
                &connections_key(&session.room_id, &session.author_id),
                &session.connection_id,
            )
            .await?;

        if self.has_connections(&session.room_id, &session.author_id).await? {
            return Ok(None);
        }

        let removed = self
            .kv
            .set_remove(&participants_key(&session.room_id), &session.author_id)
            .await?;
        if !removed {
            return Ok(None);
        }
        Ok(Some(self.count(&session.room_id).await?))
    }

    /// Remove every participant that no longer holds a liveness key.
    ///
    /// Returns the new count if anyone was removed.
    pub async fn sweep(&self, room_id: &str) -> Result<Option<u64>, ApiError> {
        let key = participants_key(room_id);
        let mut changed = false;
        for author_id in self.kv.set_members(&key).await? {
            if self.has_connections(room_id, &author_id).await? {
                continue;
            }
            if self.kv.set_remove(&key, &author_id).await? {
                tracing::debug!(room_id = %room_id, author_id = %author_id, "swept stale participant");
                changed = true;
            }
        }
        if !changed {
            return Ok(None);
        }
        Ok(Some(self.count(room_id).await?))
    }

    pub async fn count(&self, room_id: &str) -> Result<u64, ApiError> {
        self.kv.set_card(&participants_key(room_id)).await
    }

    /// Whether any of the author's tracked connections still holds its
    /// liveness key. Entries whose key expired are pruned on the way.
    async fn has_connections(&self, room_id: &str, author_id: &str) -> Result<bool, ApiError> {
        let conns_key = connections_key(room_id, author_id);
        let mut alive = false;
        for connection_id in self.kv.set_members(&conns_key).await? {
            if self
                .kv
                .exists(&liveness_key(room_id, author_id, &connection_id))
                .await?
            {
                alive = true;
            } else {
                self.kv.set_remove(&conns_key, &connection_id).await?;
            }
        }
        Ok(alive)
    }
}
