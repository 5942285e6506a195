//! In-process implementations of the store and broker interfaces

pub mod in_memory;
pub mod memory_broker;

pub use in_memory::InMemoryStore;
pub use memory_broker::{DEFAULT_BROKER_CAPACITY, InMemoryBroker};
