//! Engine-level types shared by the store, the loaders and the host

use serde::{Deserialize, Serialize};
use shared::{Account, EntityId, EntityKind, Opportunity, ReportDraft, ReportStatus, Stage, Visit};
use std::fmt;

/// Why a mutation was refused before anything was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    ActiveOpportunityExists { account_id: EntityId, existing: EntityId },
    OpenReportExists { visit_id: EntityId, existing: EntityId },
    InvalidTransition { from: Stage, to: Stage },
    NotFound { kind: EntityKind, id: EntityId },
    MissingParent { kind: EntityKind, id: EntityId },
    ScoreOutOfRange { dimension: String, value: u8 },
    PendingCreate { kind: EntityKind, id: EntityId },
    StageChangeRequiresMove,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ActiveOpportunityExists { account_id, existing } => {
                write!(f, "account {account_id} already has active opportunity {existing}")
            }
            Rejection::OpenReportExists { visit_id, existing } => {
                write!(f, "visit {visit_id} already has open report {existing}")
            }
            Rejection::InvalidTransition { from, to } => write!(f, "cannot move from {from} to {to}"),
            Rejection::NotFound { kind, id } => write!(f, "{kind} {id} not found"),
            Rejection::MissingParent { kind, id } => write!(f, "parent {kind} {id} not found"),
            Rejection::ScoreOutOfRange { dimension, value } => {
                write!(f, "{dimension} must be between 0 and 5, got {value}")
            }
            Rejection::PendingCreate { kind, id } => write!(f, "{kind} {id} has not been saved yet"),
            Rejection::StageChangeRequiresMove => write!(f, "stage changes go through a stage move"),
        }
    }
}

/// Result of a mutation that reached a decision
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Persisted and reconciled with the server's canonical value
    Committed(T),
    /// Refused synchronously; the store was not touched
    Rejected(Rejection),
    /// Nothing to do, e.g. advancing a sent report
    Unchanged,
}

impl<T> Outcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    pub fn committed(self) -> Option<T> {
        match self {
            Outcome::Committed(value) => Some(value),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// Decision taken under the write lock for an update-shaped mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Plan<P> {
    Apply(P),
    Skip,
    Reject(Rejection),
}

/// Optional closing data for a stage move
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageExtra {
    pub closed_mrr: Option<f64>,
    pub loss_reason: Option<String>,
}

/// Notification published after every store transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Hydrated,
    Upserted { kind: EntityKind, id: EntityId },
    Removed { kind: EntityKind, id: EntityId },
}

/// Fetched collections handed to a single bulk hydrate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationBatch {
    pub accounts: Vec<Account>,
    pub opportunities: Vec<Opportunity>,
    pub visits: Vec<Visit>,
    pub report_drafts: Vec<ReportDraft>,
}

/// Owned copy of all four collections
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub accounts: Vec<Account>,
    pub opportunities: Vec<Opportunity>,
    pub visits: Vec<Visit>,
    pub report_drafts: Vec<ReportDraft>,
}

impl StoreSnapshot {
    pub fn total(&self) -> usize {
        self.accounts.len() + self.opportunities.len() + self.visits.len() + self.report_drafts.len()
    }

    pub fn open_reports(&self) -> impl Iterator<Item = &ReportDraft> {
        self.report_drafts.iter().filter(|r| r.status != ReportStatus::Sent)
    }
}
