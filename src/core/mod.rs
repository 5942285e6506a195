//! Core types and collaborator interfaces

pub mod auth;
pub mod broker;
pub mod error;
pub mod events;
pub mod store;

pub use auth::{Identity, IdentityProvider, StaticTokenIdentity};
pub use broker::{Broker, Feed};
pub use error::{
    ApiError, AuthError, BrokerError, CommentError, FanoutError, SendError, StoreError,
};
pub use events::{EventKind, PublishedEvent, thread_topic};
pub use store::KeyValueStore;
