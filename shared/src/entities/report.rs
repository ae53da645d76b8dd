//! Generated report drafts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, EntityPatch, Record};
use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Report lifecycle: draft, then review, then sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Review,
    Sent,
}

impl Default for ReportStatus {
    fn default() -> Self {
        ReportStatus::Draft
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Draft => write!(f, "draft"),
            ReportStatus::Review => write!(f, "review"),
            ReportStatus::Sent => write!(f, "sent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub id: EntityId,
    pub account_id: EntityId,
    #[serde(default)]
    pub visit_id: Option<EntityId>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportDraft {
    pub fn is_open(&self) -> bool {
        self.status != ReportStatus::Sent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewReportDraft {
    pub account_id: EntityId,
    pub visit_id: Option<EntityId>,
    pub title: String,
    pub body: String,
}

/// Partial report update; `status` is written by status advances only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDraftPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}

impl Record for ReportDraft {
    const KIND: EntityKind = EntityKind::ReportDraft;
    type Patch = ReportDraftPatch;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn account_id(&self) -> Option<&EntityId> {
        Some(&self.account_id)
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn apply_patch(&mut self, patch: &ReportDraftPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(body) = &patch.body {
            self.body = body.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    fn into_entity(self) -> Entity {
        Entity::ReportDraft(self)
    }

    fn from_entity(entity: Entity) -> SharedResult<Self> {
        match entity {
            Entity::ReportDraft(report) => Ok(report),
            other => Err(SharedError::KindMismatch {
                expected: EntityKind::ReportDraft,
                actual: other.kind(),
            }),
        }
    }

    fn wrap_patch(patch: ReportDraftPatch) -> EntityPatch {
        EntityPatch::ReportDraft(patch)
    }
}
