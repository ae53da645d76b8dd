//! Test helpers for engine tests
//!
//! `GatedPersistence` holds a persistence call open until the test releases
//! it, which is how the interleaving tests run feed events while a mutator
//! is suspended.

use async_trait::async_trait;
use pipeline_engine::services::{BackendOperation, InMemoryBackend};
use pipeline_engine::*;
use shared::{Entity, EntityId, EntityKind, EntityPatch};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::fixtures::TestFixtures;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// One held call: the backend has answered, the answer is not yet returned
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Resolves once the gated call has reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Persistence that forwards to an in-memory backend and can hold the
/// response of the next call of a given operation
pub struct GatedPersistence {
    inner: InMemoryBackend,
    gates: Mutex<HashMap<BackendOperation, Arc<Gate>>>,
}

impl GatedPersistence {
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Hold the next `operation` after the backend answered
    pub fn gate(&self, operation: BackendOperation) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(operation, Arc::clone(&gate));
        gate
    }

    async fn pass(&self, operation: BackendOperation) {
        let gate = self.gates.lock().unwrap().remove(&operation);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl Persistence for GatedPersistence {
    async fn fetch_all(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        let result = self.inner.fetch_all(kind).await;
        self.pass(BackendOperation::FetchAll).await;
        result
    }

    async fn create(&self, entity: Entity) -> SyncResult<Entity> {
        let result = self.inner.create(entity).await;
        self.pass(BackendOperation::Create).await;
        result
    }

    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> SyncResult<Entity> {
        let result = self.inner.update(kind, id, patch).await;
        self.pass(BackendOperation::Update).await;
        result
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> SyncResult<()> {
        let result = self.inner.delete(kind, id).await;
        self.pass(BackendOperation::Delete).await;
        result
    }
}

/// A store wired to an in-memory backend with the reconciler running
pub struct Harness<P: Persistence + 'static> {
    pub store: EntityStore<P>,
    pub reconciler: ReconcilerHandle,
}

pub struct TestHelpers;

impl TestHelpers {
    /// Backend seeded with [`TestFixtures::pipeline`]
    pub async fn seeded_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.seed(TestFixtures::pipeline()).await;
        backend
    }

    /// Store over `persistence`, subscribed to `backend`, hydrated
    pub async fn harness<P: Persistence + 'static>(persistence: Arc<P>, backend: &InMemoryBackend) -> Harness<P> {
        let store = EntityStore::new(persistence);
        let reconciler = ChangeFeedReconciler::start(store.clone(), backend, EntityKind::ALL.to_vec())
            .await
            .unwrap();
        HydrationLoader::new(store.clone()).load().await;
        Harness { store, reconciler }
    }

    /// Hydrated store over `backend` with no feed attached
    pub async fn detached_store(backend: &InMemoryBackend) -> EntityStore<InMemoryBackend> {
        let store = EntityStore::new(Arc::new(backend.clone()));
        HydrationLoader::new(store.clone()).load().await;
        store
    }

    /// Gated store over the seeded pipeline
    pub async fn gated_harness() -> (Arc<GatedPersistence>, Harness<GatedPersistence>) {
        let persistence = Arc::new(GatedPersistence::new(Self::seeded_backend().await));
        let backend = persistence.backend().clone();
        let harness = Self::harness(Arc::clone(&persistence), &backend).await;
        (persistence, harness)
    }

    /// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`]
    pub async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let waited = tokio::time::timeout(WAIT_TIMEOUT, async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "condition not met within {WAIT_TIMEOUT:?}");
    }

    pub fn id(value: &str) -> EntityId {
        EntityId::new(value)
    }
}
