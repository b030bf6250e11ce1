//! Resilient room subscription.
//!
//! Drives one stream connection per (room, author), applies its events to a
//! [`RoomTimeline`] and reports changes to the embedding UI over a channel.
//! Stream silence is the only failure signal: a missed heartbeat window, a
//! dropped connection or the UI regaining visibility after a long pause all
//! lead to a reconciliation from the timeline's watermark.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use lounge_common::wire::{event, ChatMessage, ParticipantsPayload};
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Sleep};

use crate::client::{LoungeClient, StreamOpen};
use crate::error::ClientError;
use crate::sse::{SseDecoder, SseEvent};
use crate::state::RoomTimeline;

#[derive(Debug, Clone, Copy)]
pub struct SubscriptionConfig {
    /// How long the stream may stay silent before it is presumed dead.
    /// Twice the server's heartbeat interval by default.
    pub heartbeat_timeout: Duration,
    /// Minimum heartbeat age that makes a visibility regain reconcile.
    pub visibility_threshold: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(10),
            visibility_threshold: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// A change the UI should render.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineUpdate {
    /// A stream connection is open.
    Connected,
    /// A message arrived live on the stream.
    Message(ChatMessage),
    /// Messages recovered by reconciliation, oldest first.
    Reconciled(Vec<ChatMessage>),
    Participants(u64),
    /// The stream dropped; a new connection will be attempted.
    Disconnected,
}

/// Why a subscription stopped for good.
#[derive(Debug)]
pub enum SubscriptionEnd {
    /// The room's session is not active; the server asked not to retry.
    SessionInactive { status: String, message: String },
    /// The server refused the stream for a reason retrying will not fix.
    Rejected(ClientError),
    /// The update receiver was dropped.
    Stopped,
}

/// Signals that the UI became visible again, e.g. a browser tab regaining
/// focus after the platform suspended its connection.
#[derive(Debug, Clone, Default)]
pub struct VisibilityHandle {
    notify: Arc<Notify>,
}

impl VisibilityHandle {
    pub fn regained(&self) {
        self.notify.notify_one();
    }
}

enum StreamExit {
    /// The connection ended or was presumed dead.
    Dropped,
    /// Nobody listens for updates anymore.
    Stopped,
}

pub struct RoomSubscription {
    client: LoungeClient,
    room_id: String,
    author_id: Option<String>,
    timeline: RoomTimeline,
    config: SubscriptionConfig,
    visibility: VisibilityHandle,
}

impl RoomSubscription {
    pub fn new(
        client: LoungeClient,
        room_id: impl Into<String>,
        author_id: Option<String>,
        timeline: RoomTimeline,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            client,
            room_id: room_id.into(),
            author_id,
            timeline,
            config,
            visibility: VisibilityHandle::default(),
        }
    }

    pub fn visibility_handle(&self) -> VisibilityHandle {
        self.visibility.clone()
    }

    /// Run until the session is inactive, the server rejects the stream, or
    /// `updates` is dropped. Every reconnect is a brand-new connection.
    pub async fn run(mut self, updates: mpsc::Sender<TimelineUpdate>) -> SubscriptionEnd {
        let mut backoff = self.config.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self
                .client
                .open_stream(&self.room_id, self.author_id.as_deref())
                .await
            {
                Ok(StreamOpen::Inactive { status, message }) => {
                    tracing::info!(room_id = %self.room_id, %status, %message, "room session not active");
                    return SubscriptionEnd::SessionInactive { status, message };
                }
                Ok(StreamOpen::Live(response)) => {
                    tracing::debug!(room_id = %self.room_id, attempt, "stream connected");
                    backoff = self.config.initial_backoff;
                    attempt = 0;

                    if updates.send(TimelineUpdate::Connected).await.is_err() {
                        return SubscriptionEnd::Stopped;
                    }
                    // Covers the gap before this connection subscribed.
                    if !self.reconcile(&updates).await {
                        return SubscriptionEnd::Stopped;
                    }
                    if let StreamExit::Stopped = self.pump(response, &updates).await {
                        return SubscriptionEnd::Stopped;
                    }
                }
                Err(e) if e.is_permanent() => {
                    tracing::warn!(room_id = %self.room_id, error = %e, "stream rejected");
                    return SubscriptionEnd::Rejected(e);
                }
                Err(e) => {
                    tracing::warn!(room_id = %self.room_id, attempt, error = %e, "stream connect failed");
                }
            }

            if updates.send(TimelineUpdate::Disconnected).await.is_err() {
                return SubscriptionEnd::Stopped;
            }

            tracing::debug!(room_id = %self.room_id, delay = ?backoff, "reconnecting");
            tokio::select! {
                _ = time::sleep(backoff) => {}
                _ = updates.closed() => return SubscriptionEnd::Stopped,
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    /// Read one connection until it ends, is presumed dead, or the UI goes away.
    async fn pump(
        &mut self,
        response: reqwest::Response,
        updates: &mpsc::Sender<TimelineUpdate>,
    ) -> StreamExit {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let silence = time::sleep(self.config.heartbeat_timeout);
        tokio::pin!(silence);
        let visibility = self.visibility.notify.clone();

        loop {
            tokio::select! {
                chunk = body.next() => {
                    let bytes = match chunk {
                        Some(Ok(bytes)) => bytes,
                        Some(Err(e)) => {
                            tracing::debug!(room_id = %self.room_id, error = %e, "stream read failed");
                            return StreamExit::Dropped;
                        }
                        None => {
                            tracing::debug!(room_id = %self.room_id, "stream closed by server");
                            return StreamExit::Dropped;
                        }
                    };
                    for sse in decoder.push(&bytes) {
                        if !self.apply(sse, updates, silence.as_mut()).await {
                            return StreamExit::Stopped;
                        }
                    }
                }

                _ = &mut silence => {
                    tracing::info!(room_id = %self.room_id, "no heartbeat in time, reconciling");
                    if !self.reconcile(updates).await {
                        return StreamExit::Stopped;
                    }
                    return StreamExit::Dropped;
                }

                _ = visibility.notified() => {
                    let stale = self
                        .timeline
                        .since_heartbeat(Instant::now())
                        .map_or(true, |age| age > self.config.visibility_threshold);
                    if stale && !self.reconcile(updates).await {
                        return StreamExit::Stopped;
                    }
                }

                _ = updates.closed() => return StreamExit::Stopped,
            }
        }
    }

    /// Apply one event. Returns `false` once the UI stopped listening.
    async fn apply(
        &mut self,
        sse: SseEvent,
        updates: &mpsc::Sender<TimelineUpdate>,
        silence: std::pin::Pin<&mut Sleep>,
    ) -> bool {
        match sse.event.as_str() {
            event::NEW_MESSAGE => match serde_json::from_str::<ChatMessage>(&sse.data) {
                Ok(message) => {
                    if self.timeline.insert(message.clone()) {
                        return updates.send(TimelineUpdate::Message(message)).await.is_ok();
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed new-message event"),
            },
            event::PARTICIPANTS => match serde_json::from_str::<ParticipantsPayload>(&sse.data) {
                Ok(payload) => {
                    self.timeline.set_participants(payload.count);
                    return updates
                        .send(TimelineUpdate::Participants(payload.count))
                        .await
                        .is_ok();
                }
                Err(e) => tracing::warn!(error = %e, "malformed participants event"),
            },
            event::HEARTBEAT => {
                self.timeline.record_heartbeat(Instant::now());
                silence.reset(time::Instant::now() + self.config.heartbeat_timeout);
            }
            other => tracing::debug!(event = other, "ignoring unknown stream event"),
        }
        true
    }

    /// Fetch everything from just below the watermark and merge it. Failures
    /// are logged; the next trigger retries from the same watermark.
    async fn reconcile(&mut self, updates: &mpsc::Sender<TimelineUpdate>) -> bool {
        let since = self.timeline.reconcile_since();
        match self.client.messages_since(&self.room_id, since).await {
            Ok(messages) => {
                let added = self.timeline.merge(messages);
                if added.is_empty() {
                    return !updates.is_closed();
                }
                tracing::debug!(room_id = %self.room_id, recovered = added.len(), "reconciled missed messages");
                updates.send(TimelineUpdate::Reconciled(added)).await.is_ok()
            }
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "reconciliation failed");
                !updates.is_closed()
            }
        }
    }
}
