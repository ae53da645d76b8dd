//! Trait definitions with mockall annotations for testing
//!
//! The store never talks to the network itself. It consumes the two
//! capabilities below; `services` holds the REST, WebSocket and in-memory
//! implementations, and tests inject the generated mocks.

use crate::error::SyncResult;
use shared::{sync_debug, sync_warn, Component, Entity, EntityId, EntityKind, EntityPatch, FeedEvent, FeedRecord};
use tokio::sync::{mpsc, oneshot};

/// Remote persistence service
///
/// Every call is a suspension point. Implementations return the server's
/// canonical entity; the store reconciles against it.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    /// Fetch the full collection of one kind
    async fn fetch_all(&self, kind: EntityKind) -> SyncResult<Vec<Entity>>;

    /// Create an entity; the returned copy carries the server-assigned id
    async fn create(&self, entity: Entity) -> SyncResult<Entity>;

    /// Merge a partial update and return the resulting entity
    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> SyncResult<Entity>;

    async fn delete(&self, kind: EntityKind, id: EntityId) -> SyncResult<()>;
}

/// Push stream of changes made elsewhere
#[mockall::automock]
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for the given kinds
    async fn subscribe(&self, kinds: Vec<EntityKind>) -> SyncResult<FeedSubscription>;
}

/// Live change-feed subscription
///
/// Decodes raw records into typed events. Dropping the subscription, or
/// calling [`FeedSubscription::unsubscribe`], tells the transport to stop.
#[derive(Debug)]
pub struct FeedSubscription {
    kinds: Vec<EntityKind>,
    inbound: mpsc::Receiver<FeedRecord>,
    cancel: Option<oneshot::Sender<()>>,
}

impl FeedSubscription {
    pub fn new(kinds: Vec<EntityKind>, inbound: mpsc::Receiver<FeedRecord>) -> Self {
        Self {
            kinds,
            inbound,
            cancel: None,
        }
    }

    /// Attach the transport's stop signal
    pub fn with_cancel(mut self, cancel: oneshot::Sender<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    /// Next record, raw; `None` once the transport closed
    pub async fn next_record(&mut self) -> Option<FeedRecord> {
        self.inbound.recv().await
    }

    /// Next decodable event of a subscribed kind; `None` once the transport closed.
    /// Undecodable records and other kinds are logged and skipped.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            let record = self.inbound.recv().await?;
            match self.decode(record) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(e) => {
                    sync_warn!(Component::Reconciler, error = %e, "Skipping undecodable feed record");
                }
            }
        }
    }

    /// Decode one record, `Ok(None)` for kinds this subscription did not ask for
    pub fn decode(&self, record: FeedRecord) -> SyncResult<Option<FeedEvent>> {
        if !self.kinds.contains(&record.kind) {
            sync_debug!(Component::Reconciler, kind = %record.kind, "Ignoring record of unsubscribed kind");
            return Ok(None);
        }
        Ok(Some(FeedEvent::try_from(record)?))
    }

    pub fn unsubscribe(mut self) {
        self.cancel_transport();
    }

    fn cancel_transport(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.inbound.close();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel_transport();
    }
}
