//! Shared types for the pipeline sync engine
//!
//! Contains the entity model, identifiers, change-feed messages and the
//! logging helpers used by every engine component.

pub mod entities;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use entities::*;
pub use errors::*;
pub use types::*;

pub use messages::{FeedEvent, FeedOperation, FeedRecord};
