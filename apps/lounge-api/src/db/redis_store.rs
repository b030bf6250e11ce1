//! Redis-backed [`KeyValueStore`].
//!
//! Commands go through a shared auto-reconnecting `ConnectionManager`. Each
//! subscription opens its own pub/sub connection so that dropping it
//! unsubscribes without touching anyone else.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::ApiError;

use super::kv::{KeyValueStore, Subscription};

#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!("redis connection established");
        Ok(Self { client, conn })
    }
}

fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_ms(ttl)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn del(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        Ok(conn.pexpire(key, ttl_ms(ttl) as i64).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ApiError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn set_card(&self, key: &str) -> Result<u64, ApiError> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(key).await?)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, ApiError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        // Resolves once Redis confirmed the SUBSCRIBE.
        pubsub.subscribe(channel).await?;

        let name = channel.to_string();
        let stream = pubsub
            .into_on_message()
            .filter_map(move |msg| {
                future::ready(match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(?e, channel = %name, "dropping non-text pub/sub payload");
                        None
                    }
                })
            })
            .boxed();

        Ok(Subscription::new(channel, stream))
    }
}
