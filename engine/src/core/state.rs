//! Store state and its synchronous transitions
//!
//! Everything here runs while the caller holds the store's write guard, so
//! each method is one indivisible step: read current state, decide, write.
//! Nothing in this module awaits.

use super::collection::{Collection, CreateReconciliation};
use super::rules;
use crate::types::{HydrationBatch, Rejection, StoreSnapshot};
use chrono::{DateTime, Utc};
use shared::{Account, Entity, EntityId, EntityKind, FeedEvent, Opportunity, Record, ReportDraft, Visit};
use std::collections::BTreeMap;

/// The four collections plus the hydration flag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub accounts: Collection<Account>,
    pub opportunities: Collection<Opportunity>,
    pub visits: Collection<Visit>,
    pub report_drafts: Collection<ReportDraft>,
    initialized: bool,
    /// Keys taken out by local deletes still awaiting persistence; `true`
    /// once the change feed deleted the same key
    pending_removals: BTreeMap<(EntityKind, EntityId), bool>,
}

/// Maps a record type to its collection and carries its per-kind rules
pub trait Collected: Record {
    fn collection(state: &StoreState) -> &Collection<Self>;

    fn collection_mut(state: &mut StoreState) -> &mut Collection<Self>;

    /// Checks run against current state before an optimistic create
    fn check_admission(&self, _state: &StoreState) -> Result<(), Rejection> {
        Ok(())
    }

    /// Bring derived fields in line before the record enters the store
    fn normalize(&mut self) {}
}

impl Collected for Account {
    fn collection(state: &StoreState) -> &Collection<Self> {
        &state.accounts
    }

    fn collection_mut(state: &mut StoreState) -> &mut Collection<Self> {
        &mut state.accounts
    }

    fn check_admission(&self, _state: &StoreState) -> Result<(), Rejection> {
        rules::validate_dimensions(&self.scores).map_err(|(dimension, value)| Rejection::ScoreOutOfRange {
            dimension: dimension.to_string(),
            value,
        })
    }

    fn normalize(&mut self) {
        rules::normalize_account(self);
    }
}

impl Collected for Opportunity {
    fn collection(state: &StoreState) -> &Collection<Self> {
        &state.opportunities
    }

    fn collection_mut(state: &mut StoreState) -> &mut Collection<Self> {
        &mut state.opportunities
    }

    fn check_admission(&self, state: &StoreState) -> Result<(), Rejection> {
        state.require_parent::<Account>(&self.account_id)?;
        if rules::is_active(self.stage) {
            if let Some(existing) = state.active_opportunity_for(&self.account_id) {
                return Err(Rejection::ActiveOpportunityExists {
                    account_id: self.account_id.clone(),
                    existing: existing.id.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Collected for Visit {
    fn collection(state: &StoreState) -> &Collection<Self> {
        &state.visits
    }

    fn collection_mut(state: &mut StoreState) -> &mut Collection<Self> {
        &mut state.visits
    }

    fn check_admission(&self, state: &StoreState) -> Result<(), Rejection> {
        state.require_parent::<Account>(&self.account_id)?;
        state.require_parent::<Opportunity>(&self.opportunity_id)
    }
}

impl Collected for ReportDraft {
    fn collection(state: &StoreState) -> &Collection<Self> {
        &state.report_drafts
    }

    fn collection_mut(state: &mut StoreState) -> &mut Collection<Self> {
        &mut state.report_drafts
    }

    fn check_admission(&self, state: &StoreState) -> Result<(), Rejection> {
        state.require_parent::<Account>(&self.account_id)?;
        if let Some(visit_id) = &self.visit_id {
            state.require_parent::<Visit>(visit_id)?;
            if self.is_open() {
                if let Some(existing) = state.open_report_for_visit(visit_id) {
                    return Err(Rejection::OpenReportExists {
                        visit_id: visit_id.clone(),
                        existing: existing.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Entries taken out by a delete, with their former positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    pub accounts: Vec<(usize, Account)>,
    pub opportunities: Vec<(usize, Opportunity)>,
    pub visits: Vec<(usize, Visit)>,
    pub report_drafts: Vec<(usize, ReportDraft)>,
}

impl Removal {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.accounts.len() + self.opportunities.len() + self.visits.len() + self.report_drafts.len()
    }

    /// Kind and id of every entry, parents first
    pub fn keys(&self) -> Vec<(EntityKind, EntityId)> {
        fn keys_of<T: Record>(entries: &[(usize, T)]) -> impl Iterator<Item = (EntityKind, EntityId)> + '_ {
            entries.iter().map(|(_, record)| (T::KIND, record.id().clone()))
        }

        keys_of(&self.accounts)
            .chain(keys_of(&self.opportunities))
            .chain(keys_of(&self.visits))
            .chain(keys_of(&self.report_drafts))
            .collect()
    }
}

/// What a change-feed event did to the state
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEffect {
    Inserted { kind: EntityKind, id: EntityId },
    Replaced { kind: EntityKind, id: EntityId },
    Removed(Removal),
    /// Duplicate insert, update or delete of an absent id
    Ignored,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replace all four collections and mark the store initialized
    pub fn hydrate(&mut self, batch: HydrationBatch) {
        let HydrationBatch {
            mut accounts,
            opportunities,
            visits,
            report_drafts,
        } = batch;
        for account in accounts.iter_mut() {
            account.normalize();
        }

        self.accounts = Collection::from_records(accounts);
        self.opportunities = Collection::from_records(opportunities);
        self.visits = Collection::from_records(visits);
        self.report_drafts = Collection::from_records(report_drafts);
        self.initialized = true;
    }

    pub fn get<T: Collected>(&self, id: &EntityId) -> Option<&T> {
        T::collection(self).get(id)
    }

    pub fn list<T: Collected>(&self) -> Vec<T> {
        T::collection(self).as_slice().to_vec()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            accounts: self.list(),
            opportunities: self.list(),
            visits: self.list(),
            report_drafts: self.list(),
        }
    }

    pub fn active_opportunity_for(&self, account_id: &EntityId) -> Option<&Opportunity> {
        self.opportunities
            .iter()
            .find(|o| &o.account_id == account_id && rules::is_active(o.stage))
    }

    pub fn opportunities_for_account(&self, account_id: &EntityId) -> Vec<Opportunity> {
        self.opportunities
            .iter()
            .filter(|o| &o.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn open_report_for_visit(&self, visit_id: &EntityId) -> Option<&ReportDraft> {
        self.report_drafts
            .iter()
            .find(|r| r.visit_id.as_ref() == Some(visit_id) && r.is_open())
    }

    fn require_parent<T: Collected>(&self, id: &EntityId) -> Result<(), Rejection> {
        if !T::collection(self).contains(id) {
            return Err(Rejection::MissingParent { kind: T::KIND, id: id.clone() });
        }
        if id.is_temporary() {
            return Err(Rejection::PendingCreate { kind: T::KIND, id: id.clone() });
        }
        Ok(())
    }

    /// Admission checks and optimistic insert in one step
    pub fn stage_create<T: Collected>(&mut self, record: T) -> Result<(), Rejection> {
        record.check_admission(self)?;
        T::collection_mut(self).insert_if_absent(record);
        Ok(())
    }

    /// Undo an optimistic create; false if the entry is already gone
    pub fn discard_created<T: Collected>(&mut self, temporary_id: &EntityId) -> bool {
        T::collection_mut(self).remove(temporary_id).is_some()
    }

    pub fn reconcile_created<T: Collected>(&mut self, temporary_id: &EntityId, mut canonical: T) -> CreateReconciliation {
        canonical.normalize();
        T::collection_mut(self).reconcile_created(temporary_id, canonical)
    }

    /// Merge a patch optimistically, returning the pre-mutation value
    pub fn apply_patch<T: Collected>(&mut self, id: &EntityId, patch: &T::Patch, at: DateTime<Utc>) -> Option<T> {
        let current = T::collection(self).get(id)?.clone();
        let mut next = current.clone();
        next.apply_patch(patch);
        next.touch(at);
        T::collection_mut(self).replace(next);
        Some(current)
    }

    /// Write a server copy or a rollback snapshot over a still-present entry
    pub fn overwrite<T: Collected>(&mut self, mut record: T) -> bool {
        record.normalize();
        T::collection_mut(self).replace(record).is_some()
    }

    /// Remove one entity; removing an account takes its dependents with it
    pub fn remove(&mut self, kind: EntityKind, id: &EntityId) -> Removal {
        let mut removal = Removal::default();
        match kind {
            EntityKind::Account => {
                if let Some(entry) = self.accounts.remove(id) {
                    removal.accounts.push(entry);
                    removal.opportunities = self.opportunities.extract_where(|o| &o.account_id == id);
                    removal.visits = self.visits.extract_where(|v| &v.account_id == id);
                    removal.report_drafts = self.report_drafts.extract_where(|r| &r.account_id == id);
                }
            }
            EntityKind::Opportunity => removal.opportunities.extend(self.opportunities.remove(id)),
            EntityKind::Visit => removal.visits.extend(self.visits.remove(id)),
            EntityKind::ReportDraft => removal.report_drafts.extend(self.report_drafts.remove(id)),
        }
        removal
    }

    /// Remove for a local delete. The removed keys stay pending until
    /// [`StoreState::settle_removal`] or [`StoreState::restore`].
    pub fn remove_pending(&mut self, kind: EntityKind, id: &EntityId) -> Removal {
        let removal = self.remove(kind, id);
        for key in removal.keys() {
            self.pending_removals.insert(key, false);
        }
        removal
    }

    /// The delete was persisted; forget its pending keys
    pub fn settle_removal(&mut self, keys: &[(EntityKind, EntityId)]) {
        for key in keys {
            self.pending_removals.remove(key);
        }
    }

    /// Put back what a delete took and return the keys actually restored.
    /// Skips ids that reappeared, keys the change feed deleted meanwhile and
    /// dependents of an account the feed deleted.
    pub fn restore(&mut self, removal: Removal) -> Vec<(EntityKind, EntityId)> {
        let deleted_accounts: Vec<EntityId> = removal
            .accounts
            .iter()
            .map(|(_, account)| account.id.clone())
            .filter(|id| self.deleted_remotely(EntityKind::Account, id))
            .collect();

        let mut restored = Vec::new();
        self.restore_entries(removal.accounts, |_| false, &mut restored);
        self.restore_entries(
            removal.opportunities,
            |o: &Opportunity| deleted_accounts.contains(&o.account_id),
            &mut restored,
        );
        self.restore_entries(removal.visits, |v: &Visit| deleted_accounts.contains(&v.account_id), &mut restored);
        self.restore_entries(
            removal.report_drafts,
            |r: &ReportDraft| deleted_accounts.contains(&r.account_id),
            &mut restored,
        );
        restored
    }

    fn deleted_remotely(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.pending_removals
            .get(&(kind, id.clone()))
            .copied()
            .unwrap_or(false)
    }

    fn restore_entries<T: Collected>(
        &mut self,
        entries: Vec<(usize, T)>,
        orphaned: impl Fn(&T) -> bool,
        restored: &mut Vec<(EntityKind, EntityId)>,
    ) {
        for (index, record) in entries {
            let key = (T::KIND, record.id().clone());
            let deleted = self.pending_removals.remove(&key).unwrap_or(false);
            if deleted || orphaned(&record) {
                continue;
            }
            if T::collection_mut(self).restore(index, record) {
                restored.push(key);
            }
        }
    }

    /// Merge one remote change
    pub fn apply_feed_event(&mut self, event: FeedEvent) -> FeedEffect {
        match event {
            FeedEvent::Inserted(entity) => match entity {
                Entity::Account(record) => self.insert_remote(record),
                Entity::Opportunity(record) => self.insert_remote(record),
                Entity::Visit(record) => self.insert_remote(record),
                Entity::ReportDraft(record) => self.insert_remote(record),
            },
            FeedEvent::Updated(entity) => match entity {
                Entity::Account(record) => self.replace_remote(record),
                Entity::Opportunity(record) => self.replace_remote(record),
                Entity::Visit(record) => self.replace_remote(record),
                Entity::ReportDraft(record) => self.replace_remote(record),
            },
            FeedEvent::Deleted { kind, id } => {
                if let Some(deleted) = self.pending_removals.get_mut(&(kind, id.clone())) {
                    *deleted = true;
                }
                let removal = self.remove(kind, &id);
                if removal.is_empty() {
                    FeedEffect::Ignored
                } else {
                    FeedEffect::Removed(removal)
                }
            }
        }
    }

    fn insert_remote<T: Collected>(&mut self, mut record: T) -> FeedEffect {
        record.normalize();
        let id = record.id().clone();
        if T::collection_mut(self).insert_if_absent(record) {
            FeedEffect::Inserted { kind: T::KIND, id }
        } else {
            FeedEffect::Ignored
        }
    }

    fn replace_remote<T: Collected>(&mut self, record: T) -> FeedEffect {
        let id = record.id().clone();
        if self.overwrite(record) {
            FeedEffect::Replaced { kind: T::KIND, id }
        } else {
            FeedEffect::Ignored
        }
    }
}
