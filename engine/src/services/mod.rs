//! Service implementations
//!
//! Real implementations of the capability traits. The store only ever sees
//! them through `Persistence` and `ChangeFeed`.

pub mod memory_backend;
pub mod rest_persistence;
pub mod ws_feed;

#[cfg(test)]
mod tests;

pub use memory_backend::{BackendOperation, InMemoryBackend};
pub use rest_persistence::RestPersistence;
pub use ws_feed::WebSocketChangeFeed;
