pub mod stomp;
pub mod ws_channel;

use async_trait::async_trait;

use crate::errors::AppError;

pub use ws_channel::StompWsChannel;

/// Header list carried by connect and publish calls.
pub type Headers = Vec<(String, String)>;

/// Something the broker pushed to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message { destination: String, body: String },
    /// Broker-side ERROR frame; the connection is unusable afterwards.
    Error(String),
    Closed,
}

/// Publish/subscribe channel the live feed drives. One instance per
/// connection attempt; it is never reused after `disconnect`.
#[async_trait]
pub trait PushChannel: Send {
    async fn connect(&mut self, headers: Headers) -> Result<(), AppError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), AppError>;

    async fn publish(&mut self, destination: &str, headers: Headers, body: String)
        -> Result<(), AppError>;

    /// Waits for the next inbound event. Must be cancel-safe.
    async fn next_event(&mut self) -> ChannelEvent;

    async fn disconnect(&mut self);
}

/// Produces a fresh channel for every (re)connect.
pub trait ChannelFactory: Send + Sync + 'static {
    type Channel: PushChannel + 'static;

    fn create(&self) -> Self::Channel;
}

impl<F, C> ChannelFactory for F
where
    F: Fn() -> C + Send + Sync + 'static,
    C: PushChannel + 'static,
{
    type Channel = C;

    fn create(&self) -> C {
        self()
    }
}
