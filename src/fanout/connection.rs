//! Connection identity and outbound send capability
//!
//! A transport owns the connection; the registry only keeps its id and a
//! [`ConnectionSender`]. The sender feeds a bounded queue that the transport's
//! write loop drains, so one slow socket never stalls a delivery task.

use crate::core::error::SendError;
use crate::core::events::PublishedEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A payload as handed to a connection (shared between all members of a topic)
pub type Delivery = Arc<PublishedEvent>;

/// Unique identifier of one live client session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Outbound half of a connection's delivery queue
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::Sender<Delivery>,
}

impl ConnectionSender {
    /// Create a sender and the receiver the transport's write loop drains
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Queue a payload without waiting
    pub fn send(&self, payload: Delivery) -> Result<(), SendError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
