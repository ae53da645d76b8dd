//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::SharedError;

/// Prefix carried by identities assigned locally before the server responds
pub const TEMPORARY_ID_PREFIX: &str = "tmp-";

/// Server-assigned identifier of any entity
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a local placeholder identity for an optimistic create
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether this identity was allocated locally and not yet confirmed
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The four entity kinds held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Opportunity,
    Visit,
    ReportDraft,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Opportunity,
        EntityKind::Visit,
        EntityKind::ReportDraft,
    ];

    /// Collection name used by remote services
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            EntityKind::Opportunity => "opportunities",
            EntityKind::Visit => "visits",
            EntityKind::ReportDraft => "report_drafts",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Account => write!(f, "account"),
            EntityKind::Opportunity => write!(f, "opportunity"),
            EntityKind::Visit => write!(f, "visit"),
            EntityKind::ReportDraft => write!(f, "report_draft"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "account" | "accounts" => Ok(EntityKind::Account),
            "opportunity" | "opportunities" => Ok(EntityKind::Opportunity),
            "visit" | "visits" => Ok(EntityKind::Visit),
            "report_draft" | "report_drafts" | "report" => Ok(EntityKind::ReportDraft),
            _ => Err(SharedError::UnknownKind { input: s.to_string() }),
        }
    }
}

/// Engine component emitting a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Store,
    Hydration,
    Reconciler,
    AutoSave,
    Backend,
    Host,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Store => write!(f, "store"),
            Component::Hydration => write!(f, "hydration"),
            Component::Reconciler => write!(f, "reconciler"),
            Component::AutoSave => write!(f, "autosave"),
            Component::Backend => write!(f, "backend"),
            Component::Host => write!(f, "host"),
        }
    }
}
