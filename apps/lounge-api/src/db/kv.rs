use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::ApiError;

/// Abstraction over the shared key-value store: access tokens, presence sets,
/// liveness keys and the room pub/sub channels all live here.
///
/// Backed by Redis in production and an in-memory map in tests. Every
/// operation is a single targeted command; callers never rely on
/// multi-key atomicity.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    /// Returns whether the key existed.
    async fn del(&self, key: &str) -> Result<bool, ApiError>;
    async fn exists(&self, key: &str) -> Result<bool, ApiError>;
    /// Reset the TTL of an existing key. Returns `false` if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ApiError>;

    /// Returns whether the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ApiError>;
    /// Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ApiError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, ApiError>;
    async fn set_card(&self, key: &str) -> Result<u64, ApiError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ApiError>;
    /// Subscribe to one channel. The subscription is active once this returns,
    /// so anything published afterwards is delivered to it.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ApiError>;
}

/// A live subscription to one pub/sub channel.
///
/// Dropping it unsubscribes; other subscribers of the same channel are not
/// affected.
pub struct Subscription {
    channel: String,
    stream: BoxStream<'static, String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, stream: BoxStream<'static, String>) -> Self {
        Self {
            channel: channel.into(),
            stream,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next payload in publish order, or `None` once the broker side closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.stream.next().await
    }

    pub fn unsubscribe(self) {
        tracing::debug!(channel = %self.channel, "unsubscribed");
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process dev)
// ---------------------------------------------------------------------------

/// Per-topic buffer. Receivers that fall this far behind skip messages.
const TOPIC_CAPACITY: usize = 1024;

enum Value {
    Str(String),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            topics: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the entry if its TTL has passed, then return what is left.
fn live_entry<'a>(data: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if data.get(key).is_some_and(|e| e.is_expired(now)) {
        data.remove(key);
    }
    data.get_mut(key)
}

fn wrong_type(key: &str) -> ApiError {
    tracing::error!(%key, "operation against a key holding the wrong kind of value");
    ApiError::internal("An internal error occurred")
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApiError> {
        self.data.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut data = self.data.lock();
        match live_entry(&mut data, key) {
            Some(Entry {
                value: Value::Str(v),
                ..
            }) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, ApiError> {
        let mut data = self.data.lock();
        let existed = live_entry(&mut data, key).is_some();
        data.remove(key);
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        Ok(live_entry(&mut self.data.lock(), key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ApiError> {
        let mut data = self.data.lock();
        match live_entry(&mut data, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ApiError> {
        let mut data = self.data.lock();
        if live_entry(&mut data, key).is_none() {
            data.insert(
                key.to_string(),
                Entry {
                    value: Value::Set(HashSet::new()),
                    expires_at: None,
                },
            );
        }
        match data.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ApiError> {
        let mut data = self.data.lock();
        let (removed, now_empty) = match live_entry(&mut data, key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => (set.remove(member), set.is_empty()),
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(false),
        };
        // Like Redis, an emptied set stops existing.
        if now_empty {
            data.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ApiError> {
        let mut data = self.data.lock();
        match live_entry(&mut data, key).map(|e| &e.value) {
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn set_card(&self, key: &str) -> Result<u64, ApiError> {
        let mut data = self.data.lock();
        match live_entry(&mut data, key).map(|e| &e.value) {
            Some(Value::Set(set)) => Ok(set.len() as u64),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ApiError> {
        if let Some(tx) = self.topics.get(channel) {
            // send() fails when nobody is subscribed; the message is simply dropped.
            let _ = tx.send(payload.to_string());
        }
        self.topics
            .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, ApiError> {
        let rx = self
            .topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let name = channel.to_string();
        let stream = BroadcastStream::new(rx)
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %name, skipped, "subscriber lagged behind channel");
                        None
                    }
                })
            })
            .boxed();

        Ok(Subscription::new(channel, stream))
    }
}
