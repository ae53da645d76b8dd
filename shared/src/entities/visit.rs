//! Field-assessment visits

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Entity, EntityPatch, Record};
use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Assessment axis the diagnostic notes are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticAxis {
    Strategy,
    Sales,
    Operations,
    Technology,
    People,
}

/// Free-text notes captured for one axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisNotes {
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub pain_points: String,
    #[serde(default)]
    pub recommendations: String,
}

/// A structured field assessment tied to one opportunity and one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: EntityId,
    pub opportunity_id: EntityId,
    pub account_id: EntityId,
    pub visited_on: NaiveDate,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub diagnostics: BTreeMap<DiagnosticAxis, AxisNotes>,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVisit {
    pub opportunity_id: EntityId,
    pub account_id: EntityId,
    pub visited_on: NaiveDate,
    pub attendees: Vec<String>,
    pub diagnostics: BTreeMap<DiagnosticAxis, AxisNotes>,
    pub summary: Option<String>,
}

/// Partial visit update; present axes replace their notes wholesale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visited_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<BTreeMap<DiagnosticAxis, AxisNotes>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Record for Visit {
    const KIND: EntityKind = EntityKind::Visit;
    type Patch = VisitPatch;

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

    fn apply_patch(&mut self, patch: &VisitPatch) {
        if let Some(date) = patch.visited_on {
            self.visited_on = date;
        }
        if let Some(attendees) = &patch.attendees {
            self.attendees = attendees.clone();
        }
        if let Some(diagnostics) = &patch.diagnostics {
            for (axis, notes) in diagnostics {
                self.diagnostics.insert(*axis, notes.clone());
            }
        }
        if let Some(summary) = &patch.summary {
            self.summary = Some(summary.clone());
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Visit(self)
    }

    fn from_entity(entity: Entity) -> SharedResult<Self> {
        match entity {
            Entity::Visit(visit) => Ok(visit),
            other => Err(SharedError::KindMismatch {
                expected: EntityKind::Visit,
                actual: other.kind(),
            }),
        }
    }

    fn wrap_patch(patch: VisitPatch) -> EntityPatch {
        EntityPatch::Visit(patch)
    }
}
