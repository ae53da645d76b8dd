//! Periodic auto-save of an in-progress visit
//!
//! The editor stages the latest draft; on every tick the saver issues an
//! `update_visit` for it in its own task without waiting for earlier saves.
//! Saves may therefore overlap and whichever resolves last wins.

use crate::store::EntityStore;
use crate::traits::Persistence;
use crate::types::Outcome;
use shared::{sync_debug, sync_warn, Component, EntityId, VisitPatch};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct VisitAutoSaver {
    visit_id: EntityId,
    staged: watch::Sender<Option<VisitPatch>>,
    issued: Arc<AtomicU64>,
    ticker: JoinHandle<()>,
}

impl VisitAutoSaver {
    pub fn start<P>(store: EntityStore<P>, visit_id: EntityId, interval: Duration) -> Self
    where
        P: Persistence + ?Sized + 'static,
    {
        let (staged, drafts) = watch::channel(None);
        let issued = Arc::new(AtomicU64::new(0));
        let ticker = tokio::spawn(tick(store, visit_id.clone(), interval, drafts, Arc::clone(&issued)));
        Self {
            visit_id,
            staged,
            issued,
            ticker,
        }
    }

    pub fn visit_id(&self) -> &EntityId {
        &self.visit_id
    }

    /// Replace the staged draft; the next tick saves it
    pub fn stage(&self, draft: VisitPatch) {
        self.staged.send_replace(Some(draft));
    }

    /// Saves started so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Stop ticking; saves already started run to completion
    pub async fn stop(self) {
        let Self {
            visit_id,
            issued,
            ticker,
            ..
        } = self;
        ticker.abort();
        let _ = ticker.await;
        sync_debug!(
            Component::AutoSave,
            visit_id = %visit_id,
            issued = issued.load(Ordering::Relaxed),
            "Auto-save stopped"
        );
    }
}

async fn tick<P>(
    store: EntityStore<P>,
    visit_id: EntityId,
    period: Duration,
    mut drafts: watch::Receiver<Option<VisitPatch>>,
    issued: Arc<AtomicU64>,
) where
    P: Persistence + ?Sized + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !drafts.has_changed().unwrap_or(false) {
            continue;
        }
        let Some(draft) = drafts.borrow_and_update().clone() else {
            continue;
        };

        issued.fetch_add(1, Ordering::Relaxed);
        let store = store.clone();
        let visit_id = visit_id.clone();
        tokio::spawn(async move {
            match store.update_visit(&visit_id, draft).await {
                Ok(Outcome::Committed(_)) => {
                    sync_debug!(Component::AutoSave, visit_id = %visit_id, "Draft saved");
                }
                Ok(outcome) => {
                    sync_debug!(Component::AutoSave, visit_id = %visit_id, outcome = ?outcome, "Draft not saved");
                }
                Err(e) => {
                    sync_warn!(Component::AutoSave, visit_id = %visit_id, error = %e, "Draft save failed");
                }
            }
        });
    }
}
