//! Broker interface
//!
//! The broker is the publish/subscribe primitive that connects writers (the
//! Comment Service, possibly in another process) with the fanout engine.
//! Delivery is at-most-once and best-effort: nothing is persisted, and a feed
//! only sees payloads published after it was opened.
//!
//! Closing a feed is the unsubscribe operation: drop it and the broker
//! releases whatever it held for that subscriber.

use crate::core::error::BrokerError;
use crate::core::events::PublishedEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A live subscription to one topic
///
/// Yields payloads in the order the broker emitted them. Ends when the broker
/// shuts the topic down.
pub type Feed = BoxStream<'static, PublishedEvent>;

/// Publish/subscribe primitive
#[async_trait]
pub trait Broker: Send + Sync {
    /// Deliver `payload` to every current subscriber of `topic`
    ///
    /// Returns how many feeds the payload was handed to. Zero subscribers is
    /// not an error.
    async fn publish(&self, topic: &str, payload: PublishedEvent) -> Result<usize, BrokerError>;

    /// Open a feed on `topic`
    async fn subscribe(&self, topic: &str) -> Result<Feed, BrokerError>;
}
