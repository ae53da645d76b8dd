//! Core business logic modules
//!
//! This module contains pure business logic with no I/O dependencies.
//! All functions are deterministic and easily testable.

pub mod collection;
pub mod rules;
pub mod state;
pub mod summary;

pub use collection::{Collection, CreateReconciliation};
pub use state::{Collected, FeedEffect, Removal, StoreState};
pub use summary::PipelineSummary;
