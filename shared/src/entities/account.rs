//! Account records and their scoring fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Entity, EntityPatch, Record};
use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Highest value any scoring dimension may take
pub const MAX_DIMENSION_SCORE: u8 = 5;

/// The five independent 0-5 scoring dimensions of an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreDimensions {
    pub potential: u8,
    pub maturity: u8,
    pub pain_intensity: u8,
    pub churn_risk: u8,
    pub sponsor_access: u8,
}

impl ScoreDimensions {
    pub fn new(potential: u8, maturity: u8, pain_intensity: u8, churn_risk: u8, sponsor_access: u8) -> Self {
        Self {
            potential,
            maturity,
            pain_intensity,
            churn_risk,
            sponsor_access,
        }
    }

    /// Dimension names paired with their values, in declaration order
    pub fn named(&self) -> [(&'static str, u8); 5] {
        [
            ("potential", self.potential),
            ("maturity", self.maturity),
            ("pain_intensity", self.pain_intensity),
            ("churn_risk", self.churn_risk),
            ("sponsor_access", self.sponsor_access),
        ]
    }
}

/// Account classification derived from the score total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::A => write!(f, "A"),
            Tier::B => write!(f, "B"),
            Tier::C => write!(f, "C"),
        }
    }
}

/// Prioritization bucket, serialized as 1, 2 or 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Wave {
    First,
    Second,
    Third,
}

impl From<Wave> for u8 {
    fn from(wave: Wave) -> Self {
        match wave {
            Wave::First => 1,
            Wave::Second => 2,
            Wave::Third => 3,
        }
    }
}

impl TryFrom<u8> for Wave {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Wave::First),
            2 => Ok(Wave::Second),
            3 => Ok(Wave::Third),
            other => Err(format!("wave must be 1, 2 or 3, got {other}")),
        }
    }
}

impl fmt::Display for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// A prospective or active client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub scores: ScoreDimensions,
    pub score_total: u8,
    pub tier: Tier,
    pub wave: Wave,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User input for a new account; derived fields are computed by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub sector: Option<String>,
    pub city: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
    pub scores: ScoreDimensions,
}

/// Partial account update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pain_intensity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_risk: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_access: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_total: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave: Option<Wave>,
}

impl AccountPatch {
    /// Whether any of the five scoring dimensions is present
    pub fn touches_scores(&self) -> bool {
        self.potential.is_some()
            || self.maturity.is_some()
            || self.pain_intensity.is_some()
            || self.churn_risk.is_some()
            || self.sponsor_access.is_some()
    }

    /// The dimensions that result from laying this patch over `current`
    pub fn merged_scores(&self, current: &ScoreDimensions) -> ScoreDimensions {
        ScoreDimensions {
            potential: self.potential.unwrap_or(current.potential),
            maturity: self.maturity.unwrap_or(current.maturity),
            pain_intensity: self.pain_intensity.unwrap_or(current.pain_intensity),
            churn_risk: self.churn_risk.unwrap_or(current.churn_risk),
            sponsor_access: self.sponsor_access.unwrap_or(current.sponsor_access),
        }
    }
}

impl Record for Account {
    const KIND: EntityKind = EntityKind::Account;
    type Patch = AccountPatch;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn account_id(&self) -> Option<&EntityId> {
        None
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn apply_patch(&mut self, patch: &AccountPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(sector) = &patch.sector {
            self.sector = Some(sector.clone());
        }
        if let Some(city) = &patch.city {
            self.city = Some(city.clone());
        }
        if let Some(owner) = &patch.owner {
            self.owner = Some(owner.clone());
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        self.scores = patch.merged_scores(&self.scores);
        if let Some(total) = patch.score_total {
            self.score_total = total;
        }
        if let Some(tier) = patch.tier {
            self.tier = tier;
        }
        if let Some(wave) = patch.wave {
            self.wave = wave;
        }
    }

    fn into_entity(self) -> Entity {
        Entity::Account(self)
    }

    fn from_entity(entity: Entity) -> SharedResult<Self> {
        match entity {
            Entity::Account(account) => Ok(account),
            other => Err(SharedError::KindMismatch {
                expected: EntityKind::Account,
                actual: other.kind(),
            }),
        }
    }

    fn wrap_patch(patch: AccountPatch) -> EntityPatch {
        EntityPatch::Account(patch)
    }
}
