//! Client side of a lounge room: keeps a local timeline in sync with the
//! server's event stream and repairs gaps through reconciliation.

pub mod client;
pub mod error;
pub mod sse;
pub mod state;
pub mod subscription;

pub use client::{LoungeClient, StreamOpen};
pub use error::ClientError;
pub use sse::{SseDecoder, SseEvent};
pub use state::RoomTimeline;
pub use subscription::{
    RoomSubscription, SubscriptionConfig, SubscriptionEnd, TimelineUpdate, VisibilityHandle,
};
