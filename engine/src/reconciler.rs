//! Change-feed reconciler
//!
//! Drains a feed subscription in a background task and merges each event
//! into the store as one indivisible step. Events are applied in arrival
//! order with no buffering of its own.

use crate::core::FeedEffect;
use crate::error::SyncResult;
use crate::store::EntityStore;
use crate::traits::{ChangeFeed, FeedSubscription, Persistence};
use shared::{logging, sync_debug, sync_info, Component, EntityKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Running counters for one reconciler
#[derive(Debug, Default)]
pub struct ReconcilerStats {
    applied: AtomicU64,
    ignored: AtomicU64,
    cascaded: AtomicU64,
}

impl ReconcilerStats {
    /// Events that changed the store
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Duplicate inserts and updates or deletes of absent ids
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Dependents removed along with a remotely deleted account
    pub fn cascaded(&self) -> u64 {
        self.cascaded.load(Ordering::Relaxed)
    }

    fn record(&self, effect: &FeedEffect) {
        match effect {
            FeedEffect::Inserted { .. } | FeedEffect::Replaced { .. } => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            FeedEffect::Removed(removal) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
                self.cascaded
                    .fetch_add(removal.len().saturating_sub(1) as u64, Ordering::Relaxed);
            }
            FeedEffect::Ignored => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Handle to a running reconciler
pub struct ReconcilerHandle {
    task: JoinHandle<()>,
    stats: Arc<ReconcilerStats>,
}

impl ReconcilerHandle {
    pub fn stats(&self) -> &ReconcilerStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop draining; events not yet applied are dropped with the subscription
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
        logging::log_shutdown(Component::Reconciler, "stopped");
    }
}

pub struct ChangeFeedReconciler;

impl ChangeFeedReconciler {
    /// Subscribe to `kinds` and start merging events into `store`
    pub async fn start<P, F>(
        store: EntityStore<P>,
        feed: &F,
        kinds: Vec<EntityKind>,
    ) -> SyncResult<ReconcilerHandle>
    where
        P: Persistence + ?Sized + 'static,
        F: ChangeFeed + ?Sized,
    {
        let subscription = feed.subscribe(kinds).await?;
        Ok(Self::attach(store, subscription))
    }

    /// Start draining an already open subscription
    pub fn attach<P>(store: EntityStore<P>, subscription: FeedSubscription) -> ReconcilerHandle
    where
        P: Persistence + ?Sized + 'static,
    {
        let stats = Arc::new(ReconcilerStats::default());
        logging::log_startup(
            Component::Reconciler,
            &format!("change feed reconciler for {:?}", subscription.kinds()),
        );
        let task = tokio::spawn(drain(store, subscription, Arc::clone(&stats)));
        ReconcilerHandle { task, stats }
    }
}

async fn drain<P>(store: EntityStore<P>, mut subscription: FeedSubscription, stats: Arc<ReconcilerStats>)
where
    P: Persistence + ?Sized + 'static,
{
    while let Some(event) = subscription.next_event().await {
        let kind = event.kind();
        let operation = event.operation();
        let id = event.id().clone();
        let effect = store.apply_feed_event(event).await;
        sync_debug!(
            Component::Reconciler,
            kind = %kind,
            operation = %operation,
            id = %id,
            effect = ?effect,
            "Feed event merged"
        );
        stats.record(&effect);
    }
    sync_info!(
        Component::Reconciler,
        applied = stats.applied(),
        ignored = stats.ignored(),
        "Change feed closed"
    );
}
