//! REST persistence client
//!
//! `GET /{collection}`, `POST /{collection}`, `PATCH /{collection}/{id}` and
//! `DELETE /{collection}/{id}` with JSON bodies. Records travel untagged; the
//! kind is implied by the collection.

use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{sync_debug, Component, Entity, EntityId, EntityKind, EntityPatch};
use std::time::Duration;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::traits::Persistence;

pub struct RestPersistence {
    client: Client,
    base_url: Url,
}

impl RestPersistence {
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let mut base_url = Url::parse(base_url).map_err(|e| SyncError::config("backend_url", e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::config("backend_url", "must be an absolute http(s) URL"));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn collection_url(&self, kind: EntityKind) -> SyncResult<Url> {
        self.base_url
            .join(kind.collection())
            .map_err(|e| SyncError::config("backend_url", e.to_string()))
    }

    fn record_url(&self, kind: EntityKind, id: &EntityId) -> SyncResult<Url> {
        let mut url = self.collection_url(kind)?;
        url.path_segments_mut()
            .map_err(|_| SyncError::config("backend_url", "must be an absolute http(s) URL"))?
            .push(id.as_str());
        Ok(url)
    }

    /// Turn a non-2xx answer into `RemoteStatus`
    async fn check(response: Response, operation: &str) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::RemoteStatus {
            status: status.as_u16(),
            operation: operation.to_string(),
            body,
        })
    }

    async fn decode(response: Response, kind: EntityKind) -> SyncResult<Entity> {
        let payload: serde_json::Value = response.json().await?;
        Ok(Entity::from_payload(kind, payload)?)
    }
}

#[async_trait]
impl Persistence for RestPersistence {
    async fn fetch_all(&self, kind: EntityKind) -> SyncResult<Vec<Entity>> {
        let url = self.collection_url(kind)?;
        sync_debug!(Component::Backend, url = %url, "GET");
        let response = Self::check(self.client.get(url).send().await?, "fetch_all").await?;
        let payloads: Vec<serde_json::Value> = response.json().await?;
        payloads
            .into_iter()
            .map(|payload| Entity::from_payload(kind, payload).map_err(SyncError::from))
            .collect()
    }

    async fn create(&self, entity: Entity) -> SyncResult<Entity> {
        let kind = entity.kind();
        let url = self.collection_url(kind)?;
        sync_debug!(Component::Backend, url = %url, "POST");
        let body = entity.to_payload()?;
        let response = Self::check(self.client.post(url).json(&body).send().await?, "create").await?;
        Self::decode(response, kind).await
    }

    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> SyncResult<Entity> {
        if patch.kind() != kind {
            return Err(SyncError::UnexpectedKind {
                expected: kind,
                actual: patch.kind(),
            });
        }
        let url = self.record_url(kind, &id)?;
        sync_debug!(Component::Backend, url = %url, "PATCH");
        let body = patch.to_payload()?;
        let response = Self::check(self.client.patch(url).json(&body).send().await?, "update").await?;
        Self::decode(response, kind).await
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> SyncResult<()> {
        let url = self.record_url(kind, &id)?;
        sync_debug!(Component::Backend, url = %url, "DELETE");
        Self::check(self.client.delete(url).send().await?, "delete").await?;
        Ok(())
    }
}
