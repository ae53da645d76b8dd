//! Entity model for the pipeline
//!
//! Four entity kinds share one shape: a server-assigned id, creation and
//! modification timestamps, and a typed partial-update struct. The [`Record`]
//! trait captures that shape so the store can run one optimistic protocol
//! over all of them; [`Entity`] and [`EntityPatch`] are the sum types used at
//! the capability boundary.

pub mod account;
pub mod opportunity;
pub mod report;
pub mod visit;

pub use account::{Account, AccountPatch, NewAccount, ScoreDimensions, Tier, Wave, MAX_DIMENSION_SCORE};
pub use opportunity::{NewOpportunity, Opportunity, OpportunityPatch, Stage};
pub use report::{NewReportDraft, ReportDraft, ReportDraftPatch, ReportStatus};
pub use visit::{AxisNotes, DiagnosticAxis, NewVisit, Visit, VisitPatch};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::errors::{SharedError, SharedResult};
use crate::types::{EntityId, EntityKind};

/// Common behaviour of the four entity types
pub trait Record: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    type Patch: Clone + Debug + Default + PartialEq + Serialize + Send + Sync + 'static;

    fn id(&self) -> &EntityId;

    /// Owning account, `None` for accounts themselves
    fn account_id(&self) -> Option<&EntityId>;

    fn updated_at(&self) -> DateTime<Utc>;

    fn touch(&mut self, at: DateTime<Utc>);

    fn apply_patch(&mut self, patch: &Self::Patch);

    fn into_entity(self) -> Entity;

    fn from_entity(entity: Entity) -> SharedResult<Self>;

    fn wrap_patch(patch: Self::Patch) -> EntityPatch;
}

/// Any entity, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Entity {
    Account(Account),
    Opportunity(Opportunity),
    Visit(Visit),
    ReportDraft(ReportDraft),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Account(_) => EntityKind::Account,
            Entity::Opportunity(_) => EntityKind::Opportunity,
            Entity::Visit(_) => EntityKind::Visit,
            Entity::ReportDraft(_) => EntityKind::ReportDraft,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Entity::Account(e) => &e.id,
            Entity::Opportunity(e) => &e.id,
            Entity::Visit(e) => &e.id,
            Entity::ReportDraft(e) => &e.id,
        }
    }

    /// Decode a loosely-typed record of a known kind
    pub fn from_payload(kind: EntityKind, payload: serde_json::Value) -> SharedResult<Self> {
        fn decode<T: Record>(payload: serde_json::Value) -> SharedResult<Entity> {
            serde_json::from_value::<T>(payload)
                .map(Record::into_entity)
                .map_err(|e| SharedError::DecodeError {
                    kind: T::KIND,
                    message: e.to_string(),
                })
        }

        match kind {
            EntityKind::Account => decode::<Account>(payload),
            EntityKind::Opportunity => decode::<Opportunity>(payload),
            EntityKind::Visit => decode::<Visit>(payload),
            EntityKind::ReportDraft => decode::<ReportDraft>(payload),
        }
    }

    /// The untagged record, as remote services exchange it
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Entity::Account(e) => serde_json::to_value(e),
            Entity::Opportunity(e) => serde_json::to_value(e),
            Entity::Visit(e) => serde_json::to_value(e),
            Entity::ReportDraft(e) => serde_json::to_value(e),
        }
    }

    /// Merge a patch of the same kind into this entity
    pub fn apply_patch(&mut self, patch: &EntityPatch) -> SharedResult<()> {
        match (self, patch) {
            (Entity::Account(e), EntityPatch::Account(p)) => e.apply_patch(p),
            (Entity::Opportunity(e), EntityPatch::Opportunity(p)) => e.apply_patch(p),
            (Entity::Visit(e), EntityPatch::Visit(p)) => e.apply_patch(p),
            (Entity::ReportDraft(e), EntityPatch::ReportDraft(p)) => e.apply_patch(p),
            (entity, patch) => {
                return Err(SharedError::KindMismatch {
                    expected: entity.kind(),
                    actual: patch.kind(),
                })
            }
        }
        Ok(())
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        match self {
            Entity::Account(e) => e.touch(at),
            Entity::Opportunity(e) => e.touch(at),
            Entity::Visit(e) => e.touch(at),
            Entity::ReportDraft(e) => e.touch(at),
        }
    }
}

/// Any partial update, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "patch", rename_all = "snake_case")]
pub enum EntityPatch {
    Account(AccountPatch),
    Opportunity(OpportunityPatch),
    Visit(VisitPatch),
    ReportDraft(ReportDraftPatch),
}

impl EntityPatch {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPatch::Account(_) => EntityKind::Account,
            EntityPatch::Opportunity(_) => EntityKind::Opportunity,
            EntityPatch::Visit(_) => EntityKind::Visit,
            EntityPatch::ReportDraft(_) => EntityKind::ReportDraft,
        }
    }

    /// The untagged patch body
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            EntityPatch::Account(p) => serde_json::to_value(p),
            EntityPatch::Opportunity(p) => serde_json::to_value(p),
            EntityPatch::Visit(p) => serde_json::to_value(p),
            EntityPatch::ReportDraft(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_payload() -> serde_json::Value {
        json!({
            "id": "r-1",
            "account_id": "a-1",
            "visit_id": null,
            "title": "Assessment",
            "body": "",
            "status": "review",
            "created_at": "2026-01-05T09:00:00Z",
            "updated_at": "2026-01-05T09:00:00Z"
        })
    }

    #[test]
    fn test_from_payload_decodes_known_kind() {
        let entity = Entity::from_payload(EntityKind::ReportDraft, report_payload()).unwrap();
        assert_eq!(entity.kind(), EntityKind::ReportDraft);
        assert_eq!(entity.id().as_str(), "r-1");
    }

    #[test]
    fn test_from_payload_reports_kind_on_failure() {
        let err = Entity::from_payload(EntityKind::Account, report_payload()).unwrap_err();
        match err {
            SharedError::DecodeError { kind, .. } => assert_eq!(kind, EntityKind::Account),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_patch_rejects_other_kind() {
        let mut entity = Entity::from_payload(EntityKind::ReportDraft, report_payload()).unwrap();
        let err = entity
            .apply_patch(&EntityPatch::Visit(VisitPatch::default()))
            .unwrap_err();
        assert!(matches!(err, SharedError::KindMismatch { .. }));
    }

    #[test]
    fn test_apply_patch_merges_fields() {
        let mut entity = Entity::from_payload(EntityKind::ReportDraft, report_payload()).unwrap();
        entity
            .apply_patch(&EntityPatch::ReportDraft(ReportDraftPatch {
                body: Some("Findings".to_string()),
                ..Default::default()
            }))
            .unwrap();
        match entity {
            Entity::ReportDraft(report) => {
                assert_eq!(report.body, "Findings");
                assert_eq!(report.status, ReportStatus::Review);
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }
}
