//! Client-side state synchronization engine for a commercial pipeline
//!
//! Keeps a local cache of accounts, opportunities, visits and report drafts
//! consistent across optimistic local mutations, authoritative responses from
//! a persistence service, and a push stream of changes made elsewhere. The
//! business rules in [`core::rules`] apply whichever channel produced a change.

pub mod autosave;
pub mod config;
pub mod core;
pub mod error;
pub mod hydration;
pub mod reconciler;
pub mod services;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use autosave::VisitAutoSaver;
pub use config::SyncConfig;
pub use core::{PipelineSummary, StoreState};
pub use error::{SyncError, SyncResult};
pub use hydration::{HydrationLoader, HydrationReport};
pub use reconciler::{ChangeFeedReconciler, ReconcilerHandle, ReconcilerStats};
pub use store::EntityStore;
pub use traits::{ChangeFeed, FeedSubscription, Persistence};
pub use types::{HydrationBatch, Outcome, Plan, Rejection, StageExtra, StoreChange, StoreSnapshot};
