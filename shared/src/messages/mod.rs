//! Message types exchanged with the remote services
//!
//! - `feed`: change-feed notifications (insert/update/delete per entity kind)

pub mod feed;

pub use feed::{FeedEvent, FeedOperation, FeedRecord};
