//! WebSocket change feed
//!
//! Connects, sends `{"type":"subscribe","kinds":[...]}` and forwards every
//! JSON text frame as a [`FeedRecord`]. The connection closes when the
//! subscription is dropped or unsubscribed.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use shared::{sync_debug, sync_warn, Component, EntityKind, FeedRecord};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::traits::{ChangeFeed, FeedSubscription};

pub struct WebSocketChangeFeed {
    url: Url,
    buffer: usize,
}

impl WebSocketChangeFeed {
    pub fn new(url: &str, buffer: usize) -> SyncResult<Self> {
        let url = Url::parse(url).map_err(|e| SyncError::config("feed_url", e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(SyncError::config("feed_url", "scheme must be ws or wss"));
        }
        Ok(Self {
            url,
            buffer: buffer.max(1),
        })
    }
}

/// First frame sent after connecting
pub fn subscribe_frame(kinds: &[EntityKind]) -> String {
    serde_json::json!({ "type": "subscribe", "kinds": kinds }).to_string()
}

#[async_trait]
impl ChangeFeed for WebSocketChangeFeed {
    async fn subscribe(&self, kinds: Vec<EntityKind>) -> SyncResult<FeedSubscription> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = stream.split();
        write.send(Message::Text(subscribe_frame(&kinds))).await?;
        sync_debug!(Component::Reconciler, url = %self.url, kinds = ?kinds, "Feed subscribed");

        let (tx, rx) = mpsc::channel(self.buffer);
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<FeedRecord>(&text) {
                            Ok(record) => {
                                if tx.send(record).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                sync_warn!(Component::Reconciler, error = %e, "Dropping malformed feed frame");
                            }
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            sync_warn!(Component::Reconciler, error = %e, "Feed connection failed");
                            break;
                        }
                    }
                }
            }
            sync_debug!(Component::Reconciler, "Feed connection closed");
        });

        Ok(FeedSubscription::new(kinds, rx).with_cancel(cancel_tx))
    }
}
