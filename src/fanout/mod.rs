//! Connection registry and fanout engine
//!
//! Transports register connections and join/leave thread topics; the engine
//! keeps one broker subscription per watched topic and pushes every payload
//! to that topic's members.

pub mod connection;
pub mod engine;
pub mod registry;

pub use connection::{ConnectionId, ConnectionSender, Delivery};
pub use engine::{DEFAULT_OUTBOUND_BUFFER, DeliveryReport, FanoutEngine};
pub use registry::{ConnectionRegistry, JoinOutcome, LeaveOutcome};
