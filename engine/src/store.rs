//! Entity store: the single owner of the cached collections
//!
//! Every mutator runs the same optimistic protocol:
//!
//! 1. take the write guard, check the request against current state, keep
//!    the pre-mutation value and apply the change, release the guard
//! 2. persist through the [`Persistence`] capability with no guard held
//! 3. take the write guard again and either reconcile with the server's
//!    canonical entity or put the pre-mutation value back
//!
//! Rejections are decided in step 1 and never reach the network. Because the
//! change feed may run between steps 1 and 3, reconciliation and rollback only
//! touch entries that are still where step 1 left them.

use crate::config::SyncConfig;
use crate::core::{rules, Collected, CreateReconciliation, FeedEffect, StoreState};
use crate::error::{SyncError, SyncResult};
use crate::traits::Persistence;
use crate::types::{HydrationBatch, Outcome, Plan, Rejection, StageExtra, StoreChange, StoreSnapshot};
use chrono::Utc;
use shared::{
    sync_debug, sync_info, sync_warn, Account, AccountPatch, Component, EntityId, EntityKind, FeedEvent, NewAccount,
    NewOpportunity, NewReportDraft, NewVisit, Opportunity, OpportunityPatch, ReportDraft, ReportDraftPatch,
    ReportStatus, Stage, Visit, VisitPatch,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub struct EntityStore<P>
where
    P: Persistence + ?Sized + 'static,
{
    state: Arc<RwLock<StoreState>>,
    persistence: Arc<P>,
    changes: broadcast::Sender<StoreChange>,
    initialized: Arc<AtomicBool>,
}

impl<P> Clone for EntityStore<P>
where
    P: Persistence + ?Sized + 'static,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            persistence: Arc::clone(&self.persistence),
            changes: self.changes.clone(),
            initialized: Arc::clone(&self.initialized),
        }
    }
}

impl<P> EntityStore<P>
where
    P: Persistence + ?Sized + 'static,
{
    pub fn new(persistence: Arc<P>) -> Self {
        Self::with_config(persistence, &SyncConfig::default())
    }

    pub fn with_config(persistence: Arc<P>, config: &SyncConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_buffer.max(1));
        Self {
            state: Arc::new(RwLock::new(StoreState::new())),
            persistence,
            changes,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    /// Stream of notifications, one per entity touched by a transition
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// True once a bulk hydrate has run
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Replace all four collections and flip `initialized` in one step
    pub async fn hydrate(&self, batch: HydrationBatch) {
        let counts = [
            batch.accounts.len(),
            batch.opportunities.len(),
            batch.visits.len(),
            batch.report_drafts.len(),
        ];
        {
            let mut state = self.state.write().await;
            state.hydrate(batch);
            self.initialized.store(true, Ordering::Release);
        }
        sync_info!(
            Component::Store,
            accounts = counts[0],
            opportunities = counts[1],
            visits = counts[2],
            report_drafts = counts[3],
            "Store hydrated"
        );
        self.notify(StoreChange::Hydrated);
    }

    // ---- reads ----

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.list()
    }

    pub async fn opportunities(&self) -> Vec<Opportunity> {
        self.state.read().await.list()
    }

    pub async fn visits(&self) -> Vec<Visit> {
        self.state.read().await.list()
    }

    pub async fn report_drafts(&self) -> Vec<ReportDraft> {
        self.state.read().await.list()
    }

    pub async fn get_account(&self, id: &EntityId) -> Option<Account> {
        self.get(id).await
    }

    pub async fn get_opportunity(&self, id: &EntityId) -> Option<Opportunity> {
        self.get(id).await
    }

    pub async fn get_visit(&self, id: &EntityId) -> Option<Visit> {
        self.get(id).await
    }

    pub async fn get_report_draft(&self, id: &EntityId) -> Option<ReportDraft> {
        self.get(id).await
    }

    pub async fn opportunities_for_account(&self, account_id: &EntityId) -> Vec<Opportunity> {
        self.state.read().await.opportunities_for_account(account_id)
    }

    pub async fn active_opportunity_for(&self, account_id: &EntityId) -> Option<Opportunity> {
        self.state.read().await.active_opportunity_for(account_id).cloned()
    }

    async fn get<T: Collected>(&self, id: &EntityId) -> Option<T> {
        self.state.read().await.get::<T>(id).cloned()
    }

    // ---- accounts ----

    pub async fn create_account(&self, input: NewAccount) -> SyncResult<Outcome<Account>> {
        let now = Utc::now();
        let derived = rules::derive(&input.scores);
        let account = Account {
            id: EntityId::temporary(),
            name: input.name,
            sector: input.sector,
            city: input.city,
            owner: input.owner,
            notes: input.notes,
            scores: input.scores,
            score_total: derived.score_total,
            tier: derived.tier,
            wave: derived.wave,
            created_at: now,
            updated_at: now,
        };
        self.create_record(account).await
    }

    /// Dimension changes recompute the derived triple in the same patch
    pub async fn update_account(&self, id: &EntityId, patch: AccountPatch) -> SyncResult<Outcome<Account>> {
        self.update_record(id, move |current: &Account| {
            let mut patch = patch;
            patch.score_total = None;
            patch.tier = None;
            patch.wave = None;
            if patch == AccountPatch::default() {
                return Plan::Skip;
            }
            if patch.touches_scores() {
                let scores = patch.merged_scores(&current.scores);
                if let Err((dimension, value)) = rules::validate_dimensions(&scores) {
                    return Plan::Reject(Rejection::ScoreOutOfRange {
                        dimension: dimension.to_string(),
                        value,
                    });
                }
                let derived = rules::derive(&scores);
                patch.score_total = Some(derived.score_total);
                patch.tier = Some(derived.tier);
                patch.wave = Some(derived.wave);
            }
            Plan::Apply(patch)
        })
        .await
    }

    /// Removes the account with its opportunities, visits and report drafts
    pub async fn delete_account(&self, id: &EntityId) -> SyncResult<Outcome<usize>> {
        self.delete_record(EntityKind::Account, id).await
    }

    // ---- opportunities ----

    /// Rejected without a network call while the account has an active opportunity
    pub async fn create_opportunity(&self, input: NewOpportunity) -> SyncResult<Outcome<Opportunity>> {
        let now = Utc::now();
        let opportunity = Opportunity {
            id: EntityId::temporary(),
            account_id: input.account_id,
            title: input.title,
            stage: input.stage,
            estimated_mrr: input.estimated_mrr,
            closed_mrr: None,
            loss_reason: None,
            close_date: None,
            next_step: input.next_step,
            next_step_date: input.next_step_date,
            created_at: now,
            updated_at: now,
        };
        self.create_record(opportunity).await
    }

    pub async fn update_opportunity(&self, id: &EntityId, patch: OpportunityPatch) -> SyncResult<Outcome<Opportunity>> {
        self.update_record(id, move |current: &Opportunity| {
            let mut patch = patch;
            match patch.stage {
                Some(stage) if stage != current.stage => return Plan::Reject(Rejection::StageChangeRequiresMove),
                Some(_) => patch.stage = None,
                None => {}
            }
            if patch == OpportunityPatch::default() {
                return Plan::Skip;
            }
            Plan::Apply(patch)
        })
        .await
    }

    pub async fn delete_opportunity(&self, id: &EntityId) -> SyncResult<Outcome<usize>> {
        self.delete_record(EntityKind::Opportunity, id).await
    }

    /// Single-step advance, single-step regress, or any active stage to `Lost`.
    /// Winning stamps closed revenue (defaulting to the estimate) and the close
    /// date; losing stamps the loss reason and the close date.
    pub async fn move_opportunity_stage(
        &self,
        id: &EntityId,
        target: Stage,
        extra: StageExtra,
    ) -> SyncResult<Outcome<Opportunity>> {
        self.update_record(id, move |current: &Opportunity| {
            if !rules::is_legal_move(current.stage, target) {
                return Plan::Reject(Rejection::InvalidTransition {
                    from: current.stage,
                    to: target,
                });
            }
            let today = Utc::now().date_naive();
            let mut patch = OpportunityPatch {
                stage: Some(target),
                ..Default::default()
            };
            match target {
                Stage::Won => {
                    patch.closed_mrr = Some(extra.closed_mrr.unwrap_or(current.estimated_mrr));
                    patch.close_date = Some(today);
                }
                Stage::Lost => {
                    patch.loss_reason = Some(extra.loss_reason.unwrap_or_default());
                    patch.close_date = Some(today);
                }
                _ => {}
            }
            Plan::Apply(patch)
        })
        .await
    }

    // ---- visits ----

    pub async fn create_visit(&self, input: NewVisit) -> SyncResult<Outcome<Visit>> {
        let now = Utc::now();
        let visit = Visit {
            id: EntityId::temporary(),
            opportunity_id: input.opportunity_id,
            account_id: input.account_id,
            visited_on: input.visited_on,
            attendees: input.attendees,
            diagnostics: input.diagnostics,
            summary: input.summary,
            created_at: now,
            updated_at: now,
        };
        self.create_record(visit).await
    }

    pub async fn update_visit(&self, id: &EntityId, patch: VisitPatch) -> SyncResult<Outcome<Visit>> {
        self.update_record(id, move |_: &Visit| {
            if patch == VisitPatch::default() {
                Plan::Skip
            } else {
                Plan::Apply(patch)
            }
        })
        .await
    }

    pub async fn delete_visit(&self, id: &EntityId) -> SyncResult<Outcome<usize>> {
        self.delete_record(EntityKind::Visit, id).await
    }

    // ---- report drafts ----

    /// Rejected without a network call while the visit has an unsent draft
    pub async fn create_report_draft(&self, input: NewReportDraft) -> SyncResult<Outcome<ReportDraft>> {
        let now = Utc::now();
        let report = ReportDraft {
            id: EntityId::temporary(),
            account_id: input.account_id,
            visit_id: input.visit_id,
            title: input.title,
            body: input.body,
            status: ReportStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        self.create_record(report).await
    }

    /// Title and body only; status moves through [`EntityStore::advance_report_status`]
    pub async fn update_report_draft(&self, id: &EntityId, patch: ReportDraftPatch) -> SyncResult<Outcome<ReportDraft>> {
        self.update_record(id, move |_: &ReportDraft| {
            let patch = ReportDraftPatch { status: None, ..patch };
            if patch == ReportDraftPatch::default() {
                Plan::Skip
            } else {
                Plan::Apply(patch)
            }
        })
        .await
    }

    pub async fn delete_report_draft(&self, id: &EntityId) -> SyncResult<Outcome<usize>> {
        self.delete_record(EntityKind::ReportDraft, id).await
    }

    /// One step along draft, review, sent; `Unchanged` once sent
    pub async fn advance_report_status(&self, id: &EntityId) -> SyncResult<Outcome<ReportDraft>> {
        self.update_record(id, |current: &ReportDraft| match rules::next_report_status(current.status) {
            Some(next) => Plan::Apply(ReportDraftPatch {
                status: Some(next),
                ..Default::default()
            }),
            None => Plan::Skip,
        })
        .await
    }

    // ---- change feed ----

    /// Merge one remote change as a single indivisible step
    pub async fn apply_feed_event(&self, event: FeedEvent) -> FeedEffect {
        let effect = {
            let mut state = self.state.write().await;
            state.apply_feed_event(event)
        };
        match &effect {
            FeedEffect::Inserted { kind, id } | FeedEffect::Replaced { kind, id } => {
                self.notify(StoreChange::Upserted {
                    kind: *kind,
                    id: id.clone(),
                });
            }
            FeedEffect::Removed(removal) => {
                for (kind, id) in removal.keys() {
                    self.notify(StoreChange::Removed { kind, id });
                }
            }
            FeedEffect::Ignored => {}
        }
        effect
    }

    // ---- protocol ----

    async fn create_record<T: Collected>(&self, optimistic: T) -> SyncResult<Outcome<T>> {
        let temporary_id = optimistic.id().clone();
        {
            let mut state = self.state.write().await;
            if let Err(rejection) = state.stage_create(optimistic.clone()) {
                sync_debug!(Component::Store, kind = %T::KIND, %rejection, "Create rejected");
                return Ok(Outcome::Rejected(rejection));
            }
        }
        self.notify(StoreChange::Upserted {
            kind: T::KIND,
            id: temporary_id.clone(),
        });

        let persisted = self
            .persistence
            .create(optimistic.into_entity())
            .await
            .and_then(|entity| T::from_entity(entity).map_err(SyncError::from));

        match persisted {
            Ok(mut canonical) => {
                canonical.normalize();
                let (reconciliation, stored) = {
                    let mut state = self.state.write().await;
                    let reconciliation = state.reconcile_created(&temporary_id, canonical.clone());
                    (reconciliation, state.get::<T>(canonical.id()).cloned())
                };
                sync_debug!(
                    Component::Store,
                    kind = %T::KIND,
                    temporary_id = %temporary_id,
                    id = %canonical.id(),
                    reconciliation = ?reconciliation,
                    "Create reconciled"
                );
                if reconciliation != CreateReconciliation::Dropped {
                    self.notify(StoreChange::Removed {
                        kind: T::KIND,
                        id: temporary_id,
                    });
                    self.notify(StoreChange::Upserted {
                        kind: T::KIND,
                        id: canonical.id().clone(),
                    });
                }
                Ok(Outcome::Committed(stored.unwrap_or(canonical)))
            }
            Err(e) => {
                let discarded = self.state.write().await.discard_created::<T>(&temporary_id);
                sync_warn!(Component::Store, kind = %T::KIND, error = %e, "Create failed, optimistic entry rolled back");
                if discarded {
                    self.notify(StoreChange::Removed {
                        kind: T::KIND,
                        id: temporary_id,
                    });
                }
                Err(e)
            }
        }
    }

    async fn update_record<T, F>(&self, id: &EntityId, plan: F) -> SyncResult<Outcome<T>>
    where
        T: Collected,
        F: FnOnce(&T) -> Plan<T::Patch>,
    {
        if id.is_temporary() {
            return Ok(Outcome::Rejected(Rejection::PendingCreate {
                kind: T::KIND,
                id: id.clone(),
            }));
        }

        let (previous, patch) = {
            let mut state = self.state.write().await;
            let Some(current) = state.get::<T>(id) else {
                return Ok(Outcome::Rejected(Rejection::NotFound {
                    kind: T::KIND,
                    id: id.clone(),
                }));
            };
            let patch = match plan(current) {
                Plan::Apply(patch) => patch,
                Plan::Skip => return Ok(Outcome::Unchanged),
                Plan::Reject(rejection) => {
                    sync_debug!(Component::Store, kind = %T::KIND, id = %id, %rejection, "Update rejected");
                    return Ok(Outcome::Rejected(rejection));
                }
            };
            match state.apply_patch::<T>(id, &patch, Utc::now()) {
                Some(previous) => (previous, patch),
                None => return Ok(Outcome::Unchanged),
            }
        };
        self.notify(StoreChange::Upserted {
            kind: T::KIND,
            id: id.clone(),
        });

        let persisted = self
            .persistence
            .update(T::KIND, id.clone(), T::wrap_patch(patch))
            .await
            .and_then(|entity| T::from_entity(entity).map_err(SyncError::from));

        match persisted {
            Ok(mut canonical) => {
                canonical.normalize();
                let written = self.state.write().await.overwrite(canonical.clone());
                if written {
                    self.notify(StoreChange::Upserted {
                        kind: T::KIND,
                        id: id.clone(),
                    });
                }
                Ok(Outcome::Committed(canonical))
            }
            Err(e) => {
                let restored = self.state.write().await.overwrite(previous);
                sync_warn!(Component::Store, kind = %T::KIND, id = %id, error = %e, "Update failed, previous value restored");
                if restored {
                    self.notify(StoreChange::Upserted {
                        kind: T::KIND,
                        id: id.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn delete_record(&self, kind: EntityKind, id: &EntityId) -> SyncResult<Outcome<usize>> {
        if id.is_temporary() {
            return Ok(Outcome::Rejected(Rejection::PendingCreate { kind, id: id.clone() }));
        }

        let removal = self.state.write().await.remove_pending(kind, id);
        if removal.is_empty() {
            return Ok(Outcome::Rejected(Rejection::NotFound { kind, id: id.clone() }));
        }
        let keys = removal.keys();
        for (kind, id) in &keys {
            self.notify(StoreChange::Removed {
                kind: *kind,
                id: id.clone(),
            });
        }

        match self.persistence.delete(kind, id.clone()).await {
            Ok(()) => {
                self.state.write().await.settle_removal(&keys);
                sync_debug!(Component::Store, kind = %kind, id = %id, removed = keys.len(), "Delete committed");
                Ok(Outcome::Committed(keys.len()))
            }
            Err(e) => {
                let restored = self.state.write().await.restore(removal);
                sync_warn!(
                    Component::Store,
                    kind = %kind,
                    id = %id,
                    error = %e,
                    restored = restored.len(),
                    "Delete failed, removed entries restored"
                );
                for (kind, id) in restored {
                    self.notify(StoreChange::Upserted { kind, id });
                }
                Err(e)
            }
        }
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }
}
