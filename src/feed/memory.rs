//! In-process feed backend.
//!
//! DESIGN
//! ======
//! `MemoryHub` plays the hosted service: one shared complaint table plus a
//! subscriber registry. Each `MemoryFeed` is one connected client. Inserts
//! are echoed to every insert subscriber (the inserting client included);
//! broadcasts go to every other client, never back to the sender.

use std::collections::HashMap;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{FeedClient, FeedError, FeedEvent, SUBSCRIPTION_BUFFER, Subscription, Topics};
use crate::complaint::{Complaint, ComplaintId, sort_newest_first};

struct Subscriber {
    client_id: Uuid,
    topics: Topics,
    tx: mpsc::Sender<FeedEvent>,
}

#[derive(Default)]
struct HubInner {
    /// Newest first.
    complaints: Vec<Complaint>,
    subscribers: HashMap<Uuid, Subscriber>,
    insert_calls: usize,
}

/// Shared in-memory store. Clone is cheap; all clones see the same table.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub pre-seeded with existing rows.
    #[must_use]
    pub fn with_complaints(mut complaints: Vec<Complaint>) -> Self {
        sort_newest_first(&mut complaints);
        Self { inner: Arc::new(Mutex::new(HubInner { complaints, ..HubInner::default() })) }
    }

    /// A new connected client.
    #[must_use]
    pub fn client(&self) -> MemoryFeed {
        MemoryFeed { hub: self.clone(), client_id: Uuid::new_v4() }
    }

    /// Rows currently stored, newest first.
    pub async fn complaints(&self) -> Vec<Complaint> {
        self.inner.lock().await.complaints.clone()
    }

    /// Number of `insert` calls made against the hub.
    pub async fn insert_calls(&self) -> usize {
        self.inner.lock().await.insert_calls
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    async fn remove_subscriber(&self, subscription_id: Uuid) {
        self.inner.lock().await.subscribers.remove(&subscription_id);
    }
}

/// One client's view of a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryFeed {
    hub: MemoryHub,
    client_id: Uuid,
}

impl MemoryFeed {
    #[must_use]
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }
}

/// Deliver without blocking the hub lock. A full or closed subscriber
/// misses the event.
fn deliver(subscriber: &Subscriber, event: FeedEvent) {
    if let Err(e) = subscriber.tx.try_send(event) {
        warn!(client_id = %subscriber.client_id, error = %e, "memory feed dropped event");
    }
}

#[async_trait::async_trait]
impl FeedClient for MemoryFeed {
    async fn fetch_all(&self) -> Result<Vec<Complaint>, FeedError> {
        Ok(self.hub.complaints().await)
    }

    async fn insert(&self, text: &str) -> Result<Complaint, FeedError> {
        let mut inner = self.hub.inner.lock().await;
        inner.insert_calls += 1;

        // Strictly increasing timestamps keep the table totally ordered.
        let now = OffsetDateTime::now_utc();
        let created_at = match inner.complaints.first() {
            Some(newest) if newest.created_at >= now => newest.created_at + Duration::microseconds(1),
            _ => now,
        };
        let complaint = Complaint::new(ComplaintId::new(Uuid::new_v4().to_string()), text, created_at);
        inner.complaints.insert(0, complaint.clone());

        let record = serde_json::to_value(&complaint).map_err(|e| FeedError::Parse(e.to_string()))?;
        for subscriber in inner.subscribers.values().filter(|s| s.topics.inserts) {
            deliver(subscriber, FeedEvent::Insert(record.clone()));
        }

        debug!(id = %complaint.id, "memory feed insert");
        Ok(complaint)
    }

    async fn subscribe(&self, topics: Topics) -> Result<Subscription, FeedError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let subscription_id = Uuid::new_v4();

        self.hub
            .inner
            .lock()
            .await
            .subscribers
            .insert(subscription_id, Subscriber { client_id: self.client_id, topics, tx });

        let hub = self.hub.clone();
        let task = tokio::spawn(async move {
            // Fires on explicit release and on drop of the sender alike.
            let _ = release_rx.await;
            hub.remove_subscriber(subscription_id).await;
        });

        Ok(Subscription::new(rx, release_tx, task))
    }

    async fn send_broadcast(&self, event: &str) -> Result<(), FeedError> {
        let inner = self.hub.inner.lock().await;
        for subscriber in inner
            .subscribers
            .values()
            .filter(|s| s.client_id != self.client_id && s.topics.wants_broadcast(event))
        {
            deliver(subscriber, FeedEvent::Broadcast { event: event.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
