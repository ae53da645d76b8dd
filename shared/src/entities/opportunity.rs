//! Opportunity records and pipeline stages

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, EntityPatch, Record};
use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Pipeline stage of an opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selected,
    Contacted,
    Meeting,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Selected,
        Stage::Contacted,
        Stage::Meeting,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::Won,
        Stage::Lost,
    ];
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Selected
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Selected => "selected",
            Stage::Contacted => "contacted",
            Stage::Meeting => "meeting",
            Stage::Proposal => "proposal",
            Stage::Negotiation => "negotiation",
            Stage::Won => "won",
            Stage::Lost => "lost",
        };
        write!(f, "{name}")
    }
}

/// A sales pursuit tied to exactly one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: EntityId,
    pub account_id: EntityId,
    pub title: String,
    pub stage: Stage,
    /// Estimated monthly recurring revenue
    pub estimated_mrr: f64,
    /// Monthly recurring revenue actually signed, set when won
    #[serde(default)]
    pub closed_mrr: Option<f64>,
    #[serde(default)]
    pub loss_reason: Option<String>,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    #[serde(default)]
    pub next_step: Option<String>,
    #[serde(default)]
    pub next_step_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub account_id: EntityId,
    pub title: String,
    pub stage: Stage,
    pub estimated_mrr: f64,
    pub next_step: Option<String>,
    pub next_step_date: Option<NaiveDate>,
}

/// Partial opportunity update. `stage` is written by stage moves only; the
/// closing fields are set by the move and may be corrected afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_mrr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_mrr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_date: Option<NaiveDate>,
}

impl Record for Opportunity {
    const KIND: EntityKind = EntityKind::Opportunity;
    type Patch = OpportunityPatch;

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

    fn apply_patch(&mut self, patch: &OpportunityPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(mrr) = patch.estimated_mrr {
            self.estimated_mrr = mrr;
        }
        if let Some(next_step) = &patch.next_step {
            self.next_step = Some(next_step.clone());
        }
        if let Some(date) = patch.next_step_date {
            self.next_step_date = Some(date);
        }
        if let Some(stage) = patch.stage {
            self.stage = stage;
        }
        if let Some(closed) = patch.closed_mrr {
            self.closed_mrr = Some(closed);
        }
        if let Some(reason) = &patch.loss_reason {
            self.loss_reason = Some(reason.clone());
        }
        if let Some(date) = patch.close_date {
            self.close_date = Some(date);
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Opportunity(self)
    }

    fn from_entity(entity: Entity) -> SharedResult<Self> {
        match entity {
            Entity::Opportunity(opportunity) => Ok(opportunity),
            other => Err(SharedError::KindMismatch {
                expected: EntityKind::Opportunity,
                actual: other.kind(),
            }),
        }
    }

    fn wrap_patch(patch: OpportunityPatch) -> EntityPatch {
        EntityPatch::Opportunity(patch)
    }
}
