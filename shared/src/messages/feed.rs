//! Change-feed messages
//!
//! The remote feed delivers loosely-typed [`FeedRecord`]s; they are decoded
//! into the strongly-typed [`FeedEvent`] sum type before any merge logic sees
//! them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::Entity;
use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Mutation reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOperation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for FeedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedOperation::Insert => write!(f, "insert"),
            FeedOperation::Update => write!(f, "update"),
            FeedOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One change notification as delivered on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub kind: EntityKind,
    pub operation: FeedOperation,
    /// Full entity snapshot for inserts and updates; at least `{"id": ..}` for deletes
    pub payload: serde_json::Value,
}

impl FeedRecord {
    pub fn insert(entity: &Entity) -> serde_json::Result<Self> {
        Ok(Self {
            kind: entity.kind(),
            operation: FeedOperation::Insert,
            payload: entity.to_payload()?,
        })
    }

    pub fn update(entity: &Entity) -> serde_json::Result<Self> {
        Ok(Self {
            kind: entity.kind(),
            operation: FeedOperation::Update,
            payload: entity.to_payload()?,
        })
    }

    pub fn delete(kind: EntityKind, id: &EntityId) -> Self {
        Self {
            kind,
            operation: FeedOperation::Delete,
            payload: serde_json::json!({ "id": id }),
        }
    }
}

/// A decoded change notification
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Inserted(Entity),
    Updated(Entity),
    Deleted { kind: EntityKind, id: EntityId },
}

impl FeedEvent {
    pub fn kind(&self) -> EntityKind {
        match self {
            FeedEvent::Inserted(entity) | FeedEvent::Updated(entity) => entity.kind(),
            FeedEvent::Deleted { kind, .. } => *kind,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            FeedEvent::Inserted(entity) | FeedEvent::Updated(entity) => entity.id(),
            FeedEvent::Deleted { id, .. } => id,
        }
    }

    pub fn operation(&self) -> FeedOperation {
        match self {
            FeedEvent::Inserted(_) => FeedOperation::Insert,
            FeedEvent::Updated(_) => FeedOperation::Update,
            FeedEvent::Deleted { .. } => FeedOperation::Delete,
        }
    }
}

impl TryFrom<FeedRecord> for FeedEvent {
    type Error = SharedError;

    fn try_from(record: FeedRecord) -> SharedResult<Self> {
        let FeedRecord { kind, operation, payload } = record;
        match operation {
            FeedOperation::Insert => Entity::from_payload(kind, payload).map(FeedEvent::Inserted),
            FeedOperation::Update => Entity::from_payload(kind, payload).map(FeedEvent::Updated),
            FeedOperation::Delete => {
                let id = payload
                    .get("id")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| SharedError::MissingField {
                        kind,
                        field: "id".to_string(),
                    })?;
                Ok(FeedEvent::Deleted {
                    kind,
                    id: EntityId::new(id),
                })
            }
        }
    }
}
