//! Process-local stand-in for the remote service
//!
//! Implements both capabilities over one in-memory dataset: assigns ids and
//! timestamps, recomputes account scoring, cascades account deletes and
//! publishes every change to all open feed subscriptions, including changes
//! the subscriber made itself. Faults and latency can be injected per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    sync_debug, sync_warn, Component, Entity, EntityId, EntityKind, EntityPatch, FeedRecord, Record,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::core::rules;
use crate::error::{SyncError, SyncResult};
use crate::traits::{ChangeFeed, FeedSubscription, Persistence};

/// Backend call that a fault can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    FetchAll,
    Create,
    Update,
    Delete,
}

impl BackendOperation {
    fn name(&self) -> &'static str {
        match self {
            BackendOperation::FetchAll => "fetch_all",
            BackendOperation::Create => "create",
            BackendOperation::Update => "update",
            BackendOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    operation: BackendOperation,
    kind: Option<EntityKind>,
}

struct Subscriber {
    kinds: Vec<EntityKind>,
    outbound: mpsc::Sender<FeedRecord>,
}

#[derive(Default)]
struct BackendState {
    records: HashMap<EntityKind, Vec<Entity>>,
    sequence: u64,
    faults: Vec<Fault>,
    subscribers: Vec<Subscriber>,
}

impl BackendState {
    fn take_fault(&mut self, operation: BackendOperation, kind: EntityKind) -> Option<SyncError> {
        let index = self
            .faults
            .iter()
            .position(|f| f.operation == operation && f.kind.map_or(true, |k| k == kind))?;
        self.faults.remove(index);
        Some(SyncError::persistence(kind, operation.name(), "injected fault"))
    }

    fn collection(&mut self, kind: EntityKind) -> &mut Vec<Entity> {
        self.records.entry(kind).or_default()
    }

    /// Next `{kind}-{n}` not already held, seeded records included
    fn next_id(&mut self, kind: EntityKind) -> EntityId {
        loop {
            self.sequence += 1;
            let id = EntityId::new(format!("{}-{}", kind, self.sequence));
            if !self.collection(kind).iter().any(|entity| entity.id() == &id) {
                return id;
            }
        }
    }

    fn publish(&mut self, record: FeedRecord) {
        self.subscribers.retain(|subscriber| {
            if !subscriber.kinds.contains(&record.kind) {
                return !subscriber.outbound.is_closed();
            }
            match subscriber.outbound.try_send(record.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sync_warn!(Component::Backend, kind = %record.kind, "Subscriber lagging, feed record dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn publish_entity(&mut self, entity: &Entity, insert: bool) {
        let record = if insert {
            FeedRecord::insert(entity)
        } else {
            FeedRecord::update(entity)
        };
        match record {
            Ok(record) => self.publish(record),
            Err(e) => sync_warn!(Component::Backend, error = %e, "Could not encode feed record"),
        }
    }
}

#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
    latency: Option<Duration>,
    buffer: usize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            latency: None,
            buffer: 1024,
        }
    }

    /// Delay every persistence call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_feed_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Store entities as-is, without publishing
    pub async fn seed(&self, entities: Vec<Entity>) {
        let mut state = self.state.lock().await;
        for mut entity in entities {
            normalize(&mut entity);
            state.collection(entity.kind()).push(entity);
        }
    }

    /// Make the next matching call fail; `None` matches any kind
    pub async fn fail_next(&self, operation: BackendOperation, kind: Option<EntityKind>) {
        self.state.lock().await.faults.push(Fault { operation, kind });
    }

    pub async fn records(&self, kind: EntityKind) -> Vec<Entity> {
        self.state.lock().await.records.get(&kind).cloned().unwrap_or_default()
    }

    pub async fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.subscribers.retain(|s| !s.outbound.is_closed());
        state.subscribers.len()
    }

    /// Push a raw record to every subscriber, as another client's change would arrive
    pub async fn publish(&self, record: FeedRecord) {
        self.state.lock().await.publish(record);
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn normalize(entity: &mut Entity) {
    if let Entity::Account(account) = entity {
        rules::normalize_account(account);
    }
}

fn assign_identity(entity: &mut Entity, id: EntityId, at: DateTime<Utc>) {
    match entity {
        Entity::Account(e) => {
            e.id = id;
            e.created_at = at;
        }
        Entity::Opportunity(e) => {
            e.id = id;
            e.created_at = at;
        }
        Entity::Visit(e) => {
            e.id = id;
            e.created_at = at;
        }
        Entity::ReportDraft(e) => {
            e.id = id;
            e.created_at = at;
        }
    }
    entity.touch(at);
}

fn owning_account(entity: &Entity) -> Option<&EntityId> {
    match entity {
        Entity::Account(_) => None,
        Entity::Opportunity(e) => e.account_id(),
        Entity::Visit(e) => e.account_id(),
        Entity::ReportDraft(e) => e.account_id(),
    }
}

fn not_found(operation: &str, kind: EntityKind, id: &EntityId) -> SyncError {
    SyncError::RemoteStatus {
        status: 404,
        operation: operation.to_string(),
        body: format!("{kind} {id} not found"),
    }
}

#[async_trait]
impl Persistence for InMemoryBackend {
    async fn fetch_all(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        self.pause().await;
        let mut state = self.state.lock().await;
        if let Some(fault) = state.take_fault(BackendOperation::FetchAll, kind) {
            return Err(fault);
        }
        Ok(state.collection(kind).clone())
    }

    async fn create(&self, entity: Entity) -> SyncResult<Entity> {
        self.pause().await;
        let kind = entity.kind();
        let mut state = self.state.lock().await;
        if let Some(fault) = state.take_fault(BackendOperation::Create, kind) {
            return Err(fault);
        }

        let mut entity = entity;
        let id = state.next_id(kind);
        assign_identity(&mut entity, id, Utc::now());
        normalize(&mut entity);
        state.collection(kind).insert(0, entity.clone());
        state.publish_entity(&entity, true);
        sync_debug!(Component::Backend, kind = %kind, id = %entity.id(), "Created");
        Ok(entity)
    }

    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> SyncResult<Entity> {
        self.pause().await;
        let mut state = self.state.lock().await;
        if let Some(fault) = state.take_fault(BackendOperation::Update, kind) {
            return Err(fault);
        }

        let entity = state
            .collection(kind)
            .iter_mut()
            .find(|e| e.id() == &id)
            .ok_or_else(|| not_found("update", kind, &id))?;
        entity.apply_patch(&patch)?;
        entity.touch(Utc::now());
        normalize(entity);
        let updated = entity.clone();
        state.publish_entity(&updated, false);
        Ok(updated)
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> SyncResult<()> {
        self.pause().await;
        let mut state = self.state.lock().await;
        if let Some(fault) = state.take_fault(BackendOperation::Delete, kind) {
            return Err(fault);
        }

        let collection = state.collection(kind);
        let index = collection
            .iter()
            .position(|e| e.id() == &id)
            .ok_or_else(|| not_found("delete", kind, &id))?;
        collection.remove(index);
        state.publish(FeedRecord::delete(kind, &id));

        if kind == EntityKind::Account {
            for dependent in [EntityKind::Opportunity, EntityKind::Visit, EntityKind::ReportDraft] {
                let mut removed = Vec::new();
                state.collection(dependent).retain(|e| {
                    if owning_account(e) == Some(&id) {
                        removed.push(e.id().clone());
                        false
                    } else {
                        true
                    }
                });
                for dependent_id in removed {
                    state.publish(FeedRecord::delete(dependent, &dependent_id));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn subscribe(&self, kinds: Vec<EntityKind>) -> SyncResult<FeedSubscription> {
        let (outbound, inbound) = mpsc::channel(self.buffer);
        self.state.lock().await.subscribers.push(Subscriber {
            kinds: kinds.clone(),
            outbound,
        });
        Ok(FeedSubscription::new(kinds, inbound))
    }
}
