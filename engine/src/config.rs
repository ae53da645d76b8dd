//! Engine configuration

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use shared::EntityKind;
use std::time::Duration;

/// Tunables for the store, the feed subscription and the bundled services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Kinds requested from the change feed
    pub feed_kinds: Vec<EntityKind>,
    pub autosave_interval: Duration,
    /// Capacity of the store's change-notification broadcast
    pub change_buffer: usize,
    /// Capacity of the channel between a feed transport and its subscription
    pub feed_buffer: usize,
    /// Transport timeout for the REST persistence client
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_kinds: EntityKind::ALL.to_vec(),
            autosave_interval: Duration::from_secs(30),
            change_buffer: 256,
            feed_buffer: 1024,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.feed_kinds.is_empty() {
            return Err(SyncError::config("feed_kinds", "at least one kind must be subscribed"));
        }
        if self.autosave_interval.is_zero() {
            return Err(SyncError::config("autosave_interval", "must be greater than zero"));
        }
        if self.change_buffer == 0 {
            return Err(SyncError::config("change_buffer", "must be greater than zero"));
        }
        if self.feed_buffer == 0 {
            return Err(SyncError::config("feed_buffer", "must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::config("request_timeout", "must be greater than zero"));
        }
        Ok(())
    }
}
