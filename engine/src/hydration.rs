//! Initial load of all four collections
//!
//! Fetches run concurrently and are awaited together; the store is then
//! hydrated in one step. A failed fetch leaves its kind empty without
//! holding back the others.

use crate::error::SyncResult;
use crate::store::EntityStore;
use crate::traits::Persistence;
use crate::types::HydrationBatch;
use serde::Serialize;
use shared::{sync_warn, Account, Component, EntityKind, Opportunity, Record, ReportDraft, Visit};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;

/// What a hydration pass loaded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HydrationReport {
    pub loaded: BTreeMap<EntityKind, usize>,
    /// Kinds whose fetch failed and were hydrated empty
    pub degraded: Vec<EntityKind>,
    /// Records dropped because they were of the wrong kind
    pub skipped: usize,
}

impl HydrationReport {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }

    pub fn loaded(&self, kind: EntityKind) -> usize {
        self.loaded.get(&kind).copied().unwrap_or(0)
    }

    fn absorb<T: Record>(&mut self, fetched: SyncResult<(Vec<T>, usize)>) -> Vec<T> {
        match fetched {
            Ok((records, skipped)) => {
                self.loaded.insert(T::KIND, records.len());
                self.skipped += skipped;
                records
            }
            Err(e) => {
                sync_warn!(Component::Hydration, kind = %T::KIND, error = %e, "Fetch failed, hydrating kind empty");
                self.loaded.insert(T::KIND, 0);
                self.degraded.push(T::KIND);
                Vec::new()
            }
        }
    }
}

pub struct HydrationLoader<P>
where
    P: Persistence + ?Sized + 'static,
{
    store: EntityStore<P>,
    report: OnceCell<HydrationReport>,
}

impl<P> HydrationLoader<P>
where
    P: Persistence + ?Sized + 'static,
{
    pub fn new(store: EntityStore<P>) -> Self {
        Self {
            store,
            report: OnceCell::new(),
        }
    }

    /// Hydrate the store; later calls return the first run's report
    pub async fn load(&self) -> HydrationReport {
        self.report.get_or_init(|| self.run()).await.clone()
    }

    pub fn report(&self) -> Option<&HydrationReport> {
        self.report.get()
    }

    async fn run(&self) -> HydrationReport {
        let persistence = self.store.persistence().as_ref();
        let (accounts, opportunities, visits, report_drafts) = tokio::join!(
            fetch::<Account, P>(persistence),
            fetch::<Opportunity, P>(persistence),
            fetch::<Visit, P>(persistence),
            fetch::<ReportDraft, P>(persistence),
        );

        let mut report = HydrationReport::default();
        let batch = HydrationBatch {
            accounts: report.absorb(accounts),
            opportunities: report.absorb(opportunities),
            visits: report.absorb(visits),
            report_drafts: report.absorb(report_drafts),
        };
        self.store.hydrate(batch).await;

        if !report.is_complete() {
            sync_warn!(
                Component::Hydration,
                degraded = ?report.degraded,
                "Hydration finished with degraded kinds"
            );
        }
        report
    }
}

async fn fetch<T, P>(persistence: &P) -> SyncResult<(Vec<T>, usize)>
where
    T: Record,
    P: Persistence + ?Sized,
{
    let entities = persistence.fetch_all(T::KIND).await?;
    let mut records = Vec::with_capacity(entities.len());
    let mut skipped = 0;
    for entity in entities {
        match T::from_entity(entity) {
            Ok(record) => records.push(record),
            Err(e) => {
                sync_warn!(Component::Hydration, kind = %T::KIND, error = %e, "Skipping record of another kind");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}
